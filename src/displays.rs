use std::sync::{Arc, Mutex};

use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub rect: Rect,
    pub primary: bool,
}

/// Source of the currently connected monitors.
pub trait DisplayProvider: Send + Sync {
    fn displays(&self) -> Vec<Display>;

    fn primary(&self) -> Option<Display> {
        let displays = self.displays();
        displays
            .iter()
            .copied()
            .find(|d| d.primary)
            .or_else(|| displays.first().copied())
    }

    /// Whether any connected display shows part of `rect`.
    fn is_applicable(&self, rect: Rect) -> bool {
        !rect.is_empty() && self.displays().iter().any(|d| d.rect.intersects(&rect))
    }
}

/// Fixed display list, replaceable at runtime to simulate hot-plugging.
#[derive(Debug, Clone, Default)]
pub struct StaticDisplays {
    displays: Arc<Mutex<Vec<Display>>>,
}

impl StaticDisplays {
    pub fn new(displays: Vec<Display>) -> Self {
        Self {
            displays: Arc::new(Mutex::new(displays)),
        }
    }

    pub fn single(width: i32, height: i32) -> Self {
        Self::new(vec![Display {
            rect: Rect::new(0, 0, width, height),
            primary: true,
        }])
    }

    pub fn set(&self, displays: Vec<Display>) {
        match self.displays.lock() {
            Ok(mut guard) => *guard = displays,
            Err(err) => tracing::error!(?err, "failed to lock display list"),
        }
    }
}

impl DisplayProvider for StaticDisplays {
    fn displays(&self) -> Vec<Display> {
        self.displays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

/// Monitors reported by the operating system.
///
/// Only Windows enumerates real monitors; elsewhere the configured fallback
/// display is reported.
#[derive(Debug, Clone)]
pub struct SystemDisplays {
    fallback: Display,
}

impl SystemDisplays {
    pub fn new(fallback_size: (i32, i32)) -> Self {
        Self {
            fallback: Display {
                rect: Rect::new(0, 0, fallback_size.0, fallback_size.1),
                primary: true,
            },
        }
    }
}

impl DisplayProvider for SystemDisplays {
    fn displays(&self) -> Vec<Display> {
        let found = enumerate_monitors();
        if found.is_empty() {
            vec![self.fallback]
        } else {
            found
        }
    }
}

#[cfg(windows)]
fn enumerate_monitors() -> Vec<Display> {
    use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO,
    };

    unsafe extern "system" fn collect(
        monitor: HMONITOR,
        _hdc: HDC,
        _clip: *mut RECT,
        data: LPARAM,
    ) -> BOOL {
        let out = &mut *(data.0 as *mut Vec<Display>);
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if GetMonitorInfoW(monitor, &mut info).as_bool() {
            let r = info.rcMonitor;
            out.push(Display {
                rect: Rect::new(r.left, r.top, r.right - r.left, r.bottom - r.top),
                // MONITORINFOF_PRIMARY
                primary: info.dwFlags & 1 != 0,
            });
        }
        BOOL(1)
    }

    let mut found: Vec<Display> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(collect),
            LPARAM(&mut found as *mut Vec<Display> as isize),
        )
    };
    if !ok.as_bool() {
        tracing::warn!("EnumDisplayMonitors failed");
    }
    found
}

#[cfg(not(windows))]
fn enumerate_monitors() -> Vec<Display> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_monitors() -> StaticDisplays {
        StaticDisplays::new(vec![
            Display {
                rect: Rect::new(1920, 0, 1280, 1024),
                primary: false,
            },
            Display {
                rect: Rect::new(0, 0, 1920, 1080),
                primary: true,
            },
        ])
    }

    #[test]
    fn primary_prefers_flagged_display() {
        let d = two_monitors();
        assert_eq!(d.primary().map(|d| d.rect.x), Some(0));
    }

    #[test]
    fn unplugged_monitor_makes_rect_inapplicable() {
        let d = two_monitors();
        let rect = Rect::new(2000, 100, 300, 300);
        assert!(d.is_applicable(rect));
        d.set(vec![Display {
            rect: Rect::new(0, 0, 1920, 1080),
            primary: true,
        }]);
        assert!(!d.is_applicable(rect));
    }
}
