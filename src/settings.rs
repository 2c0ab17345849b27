use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::{Easing, ExecutorConfig, MAX_ANIMATION};
use crate::geometry::{DockEdge, GeometryPrefs};
use crate::machine::MachineConfig;
use crate::pointer::MonitorConfig;

pub const SETTINGS_FILE_NAME: &str = "edge_dock.json";

/// Window-related settings consumed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Master switch. When off the window stays visible and never auto-hides.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Width in pixels of the strip along the dock edge that triggers Peek.
    #[serde(default = "default_edge_trigger_width")]
    pub edge_trigger_width: i32,
    #[serde(default = "default_peek_width")]
    pub peek_width: i32,
    #[serde(default = "default_hide_delay_ms")]
    pub hide_delay_ms: u64,
    #[serde(default = "default_edge_recheck_ms")]
    pub edge_recheck_ms: u64,
    #[serde(default = "default_visible_size")]
    pub visible_size: (i32, i32),
    /// Falls back to `visible_size` when unset.
    #[serde(default)]
    pub pinned_size: Option<(i32, i32)>,
    /// Last position the user dragged the pinned window to.
    #[serde(default)]
    pub pinned_position: Option<(i32, i32)>,
    #[serde(default)]
    pub dock_edge: DockEdge,
    #[serde(default = "default_peek_opacity")]
    pub peek_opacity: f32,
    #[serde(default = "default_hidden_opacity")]
    pub hidden_opacity: f32,
    #[serde(default = "default_true")]
    pub animate: bool,
    #[serde(default = "default_animation_ms")]
    pub animation_ms: u64,
    #[serde(default)]
    pub easing: Easing,
    /// Try the low-level input hook before falling back to cursor polling.
    #[serde(default = "default_true")]
    pub prefer_hook: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_sample_rate_hz")]
    pub max_sample_rate_hz: u32,
    #[serde(default = "default_shutdown_budget_ms")]
    pub shutdown_budget_ms: u64,
    /// Restore the persisted always-on-top state on start.
    #[serde(default)]
    pub start_pinned: bool,
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_true() -> bool {
    true
}

fn default_edge_trigger_width() -> i32 {
    5
}

fn default_peek_width() -> i32 {
    300
}

fn default_hide_delay_ms() -> u64 {
    2000
}

fn default_edge_recheck_ms() -> u64 {
    250
}

fn default_visible_size() -> (i32, i32) {
    (1200, 800)
}

fn default_peek_opacity() -> f32 {
    0.9
}

fn default_hidden_opacity() -> f32 {
    0.1
}

fn default_animation_ms() -> u64 {
    150
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_sample_rate_hz() -> u32 {
    60
}

fn default_shutdown_budget_ms() -> u64 {
    1000
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            edge_trigger_width: default_edge_trigger_width(),
            peek_width: default_peek_width(),
            hide_delay_ms: default_hide_delay_ms(),
            edge_recheck_ms: default_edge_recheck_ms(),
            visible_size: default_visible_size(),
            pinned_size: None,
            pinned_position: None,
            dock_edge: DockEdge::default(),
            peek_opacity: default_peek_opacity(),
            hidden_opacity: default_hidden_opacity(),
            animate: true,
            animation_ms: default_animation_ms(),
            easing: Easing::default(),
            prefer_hook: true,
            poll_interval_ms: default_poll_interval_ms(),
            max_sample_rate_hz: default_max_sample_rate_hz(),
            shutdown_budget_ms: default_shutdown_budget_ms(),
            start_pinned: false,
            debug_logging: false,
        }
    }
}

fn clamp_size((w, h): (i32, i32)) -> (i32, i32) {
    (w.max(1), h.max(1))
}

impl WindowSettings {
    /// Load settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings.sanitized())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Clamp every field to its supported range.
    pub fn sanitized(mut self) -> Self {
        self.edge_trigger_width = self.edge_trigger_width.clamp(1, 20);
        self.peek_width = self.peek_width.clamp(200, 500);
        self.hide_delay_ms = self.hide_delay_ms.clamp(500, 10_000);
        self.edge_recheck_ms = self.edge_recheck_ms.max(10);
        self.visible_size = clamp_size(self.visible_size);
        self.pinned_size = self.pinned_size.map(clamp_size);
        self.peek_opacity = self.peek_opacity.clamp(0.0, 1.0);
        self.hidden_opacity = self.hidden_opacity.clamp(0.0, 1.0);
        self.animation_ms = self.animation_ms.min(MAX_ANIMATION.as_millis() as u64);
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1000);
        self.max_sample_rate_hz = self.max_sample_rate_hz.clamp(1, 240);
        self.shutdown_budget_ms = self.shutdown_budget_ms.max(50);
        self
    }

    pub fn geometry_prefs(&self) -> GeometryPrefs {
        GeometryPrefs {
            dock_edge: self.dock_edge,
            peek_width: self.peek_width,
            visible_size: self.visible_size,
            pinned_size: self.pinned_size,
            pinned_position: self.pinned_position,
            peek_opacity: self.peek_opacity,
            hidden_opacity: self.hidden_opacity,
            animate: self.animate,
        }
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            hide_delay: Duration::from_millis(self.hide_delay_ms),
            edge_recheck: Duration::from_millis(self.edge_recheck_ms),
            edge_band: self.edge_trigger_width,
            prefs: self.geometry_prefs(),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            prefer_hook: self.prefer_hook,
            min_interval: Duration::from_secs(1) / self.max_sample_rate_hz.max(1),
            stop_budget: self.shutdown_budget() / 2,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            duration: Duration::from_millis(self.animation_ms),
            easing: self.easing,
            stop_budget: self.shutdown_budget() / 2,
            ..ExecutorConfig::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_millis(self.shutdown_budget_ms)
    }
}

/// Read access to the current window settings.
pub trait SettingsSource: Send + Sync {
    fn window_settings(&self) -> anyhow::Result<WindowSettings>;

    /// Persist the position of a dragged pinned window.
    fn store_pinned_position(&self, _position: (i32, i32)) -> anyhow::Result<()> {
        Ok(())
    }
}

/// JSON file backed settings.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for SettingsFile {
    fn window_settings(&self) -> anyhow::Result<WindowSettings> {
        WindowSettings::load(&self.path)
    }

    fn store_pinned_position(&self, position: (i32, i32)) -> anyhow::Result<()> {
        let mut settings = WindowSettings::load(&self.path)?;
        settings.pinned_position = Some(position);
        settings.save(&self.path)
    }
}

/// `<config dir>/edge_dock/edge_dock.json`, or the working directory when no
/// config directory is known.
pub fn default_settings_path() -> PathBuf {
    match dirs_next::config_dir() {
        Some(dir) => dir.join("edge_dock").join(SETTINGS_FILE_NAME),
        None => PathBuf::from(SETTINGS_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_maps_to_interval() {
        let settings = WindowSettings {
            max_sample_rate_hz: 50,
            ..WindowSettings::default()
        };
        assert_eq!(
            settings.monitor_config().min_interval,
            Duration::from_millis(20)
        );
    }
}
