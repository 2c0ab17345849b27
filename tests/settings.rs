use edge_dock::executor::Easing;
use edge_dock::geometry::DockEdge;
use edge_dock::settings::{default_settings_path, SettingsFile, SettingsSource, WindowSettings};
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn missing_or_empty_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    assert_eq!(WindowSettings::load(&missing).unwrap(), WindowSettings::default());

    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, "").unwrap();
    assert_eq!(WindowSettings::load(&empty).unwrap(), WindowSettings::default());
}

#[test]
fn defaults_match_documented_values() {
    let s = WindowSettings::default();
    assert!(s.enabled);
    assert_eq!(s.edge_trigger_width, 5);
    assert_eq!(s.peek_width, 300);
    assert_eq!(s.hide_delay_ms, 2000);
    assert_eq!(s.visible_size, (1200, 800));
    assert_eq!(s.peek_opacity, 0.9);
    assert_eq!(s.hidden_opacity, 0.1);
    assert_eq!(s.poll_interval_ms, 100);
    assert_eq!(s.dock_edge, DockEdge::Left);
    assert!(s.pinned_position.is_none());
}

#[test]
fn out_of_range_values_are_clamped_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
            "edge_trigger_width": 100,
            "peek_width": 20,
            "hide_delay_ms": 50000,
            "animation_ms": 5000,
            "poll_interval_ms": 1,
            "max_sample_rate_hz": 0,
            "peek_opacity": 3.0
        }"#,
    )
    .unwrap();

    let s = WindowSettings::load(&path).unwrap();
    assert_eq!(s.edge_trigger_width, 20);
    assert_eq!(s.peek_width, 200);
    assert_eq!(s.hide_delay_ms, 10_000);
    assert_eq!(s.animation_ms, 1000);
    assert_eq!(s.poll_interval_ms, 10);
    assert_eq!(s.max_sample_rate_hz, 1);
    assert_eq!(s.peek_opacity, 1.0);
}

#[test]
fn partial_json_fills_missing_fields() {
    let s: WindowSettings = serde_json::from_str(
        r#"{ "dock_edge": "top", "easing": "linear", "pinned_position": [10, 20] }"#,
    )
    .unwrap();
    assert_eq!(s.dock_edge, DockEdge::Top);
    assert_eq!(s.easing, Easing::Linear);
    assert_eq!(s.pinned_position, Some((10, 20)));
    assert_eq!(s.hide_delay_ms, 2000);
    assert!(s.prefer_hook);
}

#[test]
fn save_then_load_keeps_user_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");
    let settings = WindowSettings {
        hide_delay_ms: 3500,
        start_pinned: true,
        pinned_size: Some((640, 480)),
        ..WindowSettings::default()
    };
    settings.save(&path).unwrap();
    assert_eq!(WindowSettings::load(&path).unwrap(), settings);
}

#[test]
fn derived_component_configs() {
    let s = WindowSettings {
        hide_delay_ms: 1500,
        edge_trigger_width: 8,
        shutdown_budget_ms: 800,
        ..WindowSettings::default()
    };
    let machine = s.machine_config();
    assert_eq!(machine.hide_delay, Duration::from_millis(1500));
    assert_eq!(machine.edge_band, 8);
    assert_eq!(machine.prefs.peek_width, 300);
    assert_eq!(s.executor_config().duration, Duration::from_millis(150));
    assert_eq!(s.monitor_config().stop_budget, Duration::from_millis(400));
}

#[test]
fn settings_file_persists_pinned_position() {
    let dir = tempdir().unwrap();
    let file = SettingsFile::new(dir.path().join("edge_dock.json"));
    file.store_pinned_position((77, 88)).unwrap();

    let s = file.window_settings().unwrap();
    assert_eq!(s.pinned_position, Some((77, 88)));
}

#[test]
fn default_path_names_the_settings_file() {
    let path = default_settings_path();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("edge_dock.json")
    );
}
