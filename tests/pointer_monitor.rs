use edge_dock::error::ControllerError;
use edge_dock::geometry::Rect;
use edge_dock::pointer::{
    CursorPositionProvider, MockPointerSource, MonitorConfig, PointerMonitor, PointerSample,
    PointerSource, PollingSource, SampleSink, SharedBounds, Strategy,
};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn subscriber() -> (Arc<dyn SampleSink>, Receiver<PointerSample>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(tx), rx)
}

fn drain(rx: &Receiver<PointerSample>, quiet: Duration) -> Vec<PointerSample> {
    let mut out = Vec::new();
    while let Ok(sample) = rx.recv_timeout(quiet) {
        out.push(sample);
    }
    out
}

#[test]
fn start_and_stop_are_idempotent() {
    let (hook, hook_handle) = MockPointerSource::new();
    let (poller, poll_handle) = MockPointerSource::new();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, _rx) = subscriber();

    assert_eq!(monitor.start(sink.clone()).unwrap(), Strategy::Hook);
    assert_eq!(monitor.start(sink).unwrap(), Strategy::Hook);
    assert_eq!(hook_handle.install_count(), 1);
    assert_eq!(poll_handle.install_count(), 0);

    monitor.stop().unwrap();
    monitor.stop().unwrap();
    assert_eq!(hook_handle.uninstall_count(), 1);
    assert!(!monitor.is_running());
}

#[test]
fn hook_failure_degrades_to_polling() {
    let (hook, hook_handle) = MockPointerSource::failing();
    let (poller, poll_handle) = MockPointerSource::new();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, rx) = subscriber();

    assert_eq!(monitor.start(sink).unwrap(), Strategy::Polling);
    assert!(!hook_handle.is_installed());
    assert!(poll_handle.move_to(4, 4));
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    monitor.stop().unwrap();
}

#[test]
fn polling_only_when_hook_not_preferred() {
    let (hook, hook_handle) = MockPointerSource::new();
    let (poller, poll_handle) = MockPointerSource::new();
    let config = MonitorConfig {
        prefer_hook: false,
        ..MonitorConfig::default()
    };
    let mut monitor =
        PointerMonitor::new(config, Box::new(hook), Box::new(poller), SharedBounds::default());
    let (sink, _rx) = subscriber();

    assert_eq!(monitor.start(sink).unwrap(), Strategy::Polling);
    assert_eq!(hook_handle.install_count(), 0);
    assert_eq!(poll_handle.install_count(), 1);
}

#[test]
fn no_source_available_is_reported() {
    let (hook, _h) = MockPointerSource::failing();
    let (poller, _p) = MockPointerSource::failing();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, _rx) = subscriber();

    let err = monitor.start(sink).unwrap_err();
    assert!(matches!(err, ControllerError::PointerSourceUnavailable { .. }));
    assert!(!monitor.is_running());
}

#[test]
fn samples_carry_inside_window_flag() {
    let (hook, handle) = MockPointerSource::new();
    let (poller, _p) = MockPointerSource::new();
    let bounds = SharedBounds::default();
    bounds.set(Rect::new(100, 100, 200, 200));
    let mut monitor =
        PointerMonitor::new(MonitorConfig::default(), Box::new(hook), Box::new(poller), bounds);
    let (sink, rx) = subscriber();
    monitor.start(sink).unwrap();

    handle.move_to(150, 150);
    let inside = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(inside.inside_window);

    std::thread::sleep(Duration::from_millis(30));
    handle.move_to(10, 10);
    let outside = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!((outside.x, outside.y), (10, 10));
    assert!(!outside.inside_window);
    monitor.stop().unwrap();
}

#[test]
fn nothing_is_delivered_after_stop_returns() {
    let (hook, handle) = MockPointerSource::new();
    let (poller, _p) = MockPointerSource::new();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, rx) = subscriber();
    monitor.start(sink).unwrap();

    for i in 0..50 {
        handle.move_to(i, i);
    }
    monitor.stop().unwrap();
    let _ = drain(&rx, Duration::from_millis(10));

    assert!(!handle.move_to(999, 999), "source no longer installed");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn bursts_are_coalesced_to_latest_position() {
    let (hook, handle) = MockPointerSource::new();
    let (poller, _p) = MockPointerSource::new();
    let config = MonitorConfig {
        min_interval: Duration::from_millis(50),
        ..MonitorConfig::default()
    };
    let mut monitor =
        PointerMonitor::new(config, Box::new(hook), Box::new(poller), SharedBounds::default());
    let (sink, rx) = subscriber();
    monitor.start(sink).unwrap();

    for i in 0..200 {
        handle.move_to(i, 7);
    }
    let samples = drain(&rx, Duration::from_millis(200));
    monitor.stop().unwrap();

    assert!(!samples.is_empty());
    assert!(samples.len() < 200, "got {} samples", samples.len());
    assert_eq!(samples.last().map(|s| s.x), Some(199));
}

#[test]
fn press_survives_coalescing() {
    let (hook, handle) = MockPointerSource::new();
    let (poller, _p) = MockPointerSource::new();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, rx) = subscriber();
    monitor.start(sink).unwrap();

    handle.press_at(3, 3);
    handle.move_to(4, 4);
    handle.move_to(5, 5);
    let samples = drain(&rx, Duration::from_millis(150));
    monitor.stop().unwrap();

    assert!(samples.iter().any(|s| s.pressed));
}

#[test]
fn unchanged_position_is_not_redelivered() {
    let (hook, handle) = MockPointerSource::new();
    let (poller, _p) = MockPointerSource::new();
    let mut monitor = PointerMonitor::new(
        MonitorConfig::default(),
        Box::new(hook),
        Box::new(poller),
        SharedBounds::default(),
    );
    let (sink, rx) = subscriber();
    monitor.start(sink).unwrap();

    handle.move_to(20, 20);
    std::thread::sleep(Duration::from_millis(40));
    handle.move_to(20, 20);
    let samples = drain(&rx, Duration::from_millis(100));
    monitor.stop().unwrap();

    assert_eq!(samples.len(), 1);
}

struct ScriptedCursor {
    positions: Mutex<Vec<(i32, i32)>>,
}

impl CursorPositionProvider for ScriptedCursor {
    fn cursor_position(&self) -> Option<(i32, i32)> {
        let mut positions = self.positions.lock().unwrap();
        if positions.len() > 1 {
            Some(positions.remove(0))
        } else {
            positions.first().copied()
        }
    }
}

#[test]
fn polling_source_forwards_only_changes() {
    let cursor = Arc::new(ScriptedCursor {
        positions: Mutex::new(vec![(0, 0), (1, 1), (1, 1), (1, 1), (2, 2)]),
    });
    let mut source = PollingSource::new(cursor, Duration::from_millis(5));
    let (tx, rx) = mpsc::channel();
    source.install(tx).unwrap();

    let mut seen = Vec::new();
    while let Ok(raw) = rx.recv_timeout(Duration::from_millis(100)) {
        seen.push((raw.x, raw.y));
    }
    source.uninstall(Duration::from_millis(500)).unwrap();
    assert!(!source.is_installed());
    assert_eq!(seen, vec![(1, 1), (2, 2)]);
}

#[test]
fn polling_source_refuses_without_cursor() {
    struct NoCursor;
    impl CursorPositionProvider for NoCursor {
        fn cursor_position(&self) -> Option<(i32, i32)> {
            None
        }
    }
    let mut source = PollingSource::new(Arc::new(NoCursor), Duration::from_millis(5));
    let (tx, _rx) = mpsc::channel();
    assert!(source.install(tx).is_err());
    assert!(!source.is_installed());
}
