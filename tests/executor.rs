use edge_dock::displays::StaticDisplays;
use edge_dock::error::TransitionError;
use edge_dock::executor::{
    Easing, ExecutorConfig, TransitionExecutor, TransitionRequest, TransitionSink,
};
use edge_dock::geometry::{Rect, ZOrder};
use edge_dock::machine::VisibilityState;
use edge_dock::pointer::SharedBounds;
use edge_dock::surface::{RecordingSurface, SurfaceCall};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(state: VisibilityState, rect: Rect, animate: bool) -> TransitionRequest {
    TransitionRequest {
        state,
        rect,
        opacity: if state == VisibilityState::Hidden { 0.1 } else { 1.0 },
        z_order: ZOrder::Raised,
        animate,
    }
}

fn executor(duration_ms: u64) -> (TransitionExecutor, RecordingSurface, SharedBounds) {
    let surface = RecordingSurface::default();
    let bounds = SharedBounds::default();
    let config = ExecutorConfig {
        duration: Duration::from_millis(duration_ms),
        frame: Duration::from_millis(5),
        easing: Easing::Linear,
        ..ExecutorConfig::default()
    };
    let exec = TransitionExecutor::spawn(
        Box::new(surface.clone()),
        Arc::new(StaticDisplays::single(1920, 1080)),
        bounds.clone(),
        config,
    )
    .unwrap();
    (exec, surface, bounds)
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

const HIDDEN: Rect = Rect {
    x: -3,
    y: 0,
    width: 5,
    height: 1080,
};
const VISIBLE: Rect = Rect {
    x: 360,
    y: 140,
    width: 1200,
    height: 800,
};

#[test]
fn first_request_is_applied_directly() {
    let (mut exec, surface, bounds) = executor(100);
    exec.submit(request(VisibilityState::Hidden, HIDDEN, true))
        .unwrap();
    assert_eq!(bounds.get(), Some(HIDDEN));

    assert!(wait_for(|| surface.last_rect() == Some(HIDDEN)));
    assert_eq!(surface.rects(), vec![HIDDEN]);
    assert_eq!(surface.calls()[0], SurfaceCall::ZOrder(ZOrder::Raised));
    assert_eq!(surface.last_opacity(), Some(0.1));
    exec.stop().unwrap();
}

#[test]
fn animated_request_interpolates_to_target() {
    let (mut exec, surface, _bounds) = executor(80);
    exec.submit(request(VisibilityState::Hidden, HIDDEN, false))
        .unwrap();
    assert!(wait_for(|| surface.last_rect() == Some(HIDDEN)));

    exec.submit(request(VisibilityState::Visible, VISIBLE, true))
        .unwrap();
    assert!(wait_for(|| surface.last_rect() == Some(VISIBLE)));

    let rects = surface.rects();
    assert!(rects.len() > 2, "expected intermediate frames, got {rects:?}");
    assert_eq!(surface.last_opacity(), Some(1.0));
    exec.stop().unwrap();
}

#[test]
fn newer_request_supersedes_in_flight_animation() {
    let (mut exec, surface, _bounds) = executor(400);
    exec.submit(request(VisibilityState::Hidden, HIDDEN, false))
        .unwrap();
    assert!(wait_for(|| surface.last_rect() == Some(HIDDEN)));

    let peek = Rect::new(0, 0, 300, 1080);
    exec.submit(request(VisibilityState::Peek, peek, true))
        .unwrap();
    exec.submit(request(VisibilityState::Visible, VISIBLE, true))
        .unwrap();

    assert!(wait_for(|| surface.last_rect() == Some(VISIBLE)));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(surface.last_rect(), Some(VISIBLE));
    assert!(!surface.rects().contains(&peek), "superseded target never reached");
    exec.stop().unwrap();
}

#[test]
fn inapplicable_rect_is_rejected_synchronously() {
    let (mut exec, surface, bounds) = executor(50);
    let offscreen = Rect::new(5000, 5000, 100, 100);

    let err = exec
        .submit(request(VisibilityState::Visible, offscreen, false))
        .unwrap_err();
    assert_eq!(err, TransitionError::Inapplicable(offscreen));
    assert_eq!(bounds.get(), None);

    std::thread::sleep(Duration::from_millis(60));
    assert!(surface.calls().is_empty());
    exec.stop().unwrap();
}

#[test]
fn stopped_executor_refuses_requests() {
    let (mut exec, surface, _bounds) = executor(50);
    exec.stop().unwrap();
    exec.stop().unwrap();

    let err = exec
        .submit(request(VisibilityState::Hidden, HIDDEN, false))
        .unwrap_err();
    assert_eq!(err, TransitionError::Stopped);
    assert!(surface.calls().is_empty());
}
