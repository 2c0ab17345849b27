//! OS window seam used by the transition executor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use eframe::egui;

use crate::geometry::{Rect, ZOrder};

pub trait WindowSurface: Send {
    fn set_rect(&mut self, rect: Rect) -> anyhow::Result<()>;
    fn set_opacity(&mut self, opacity: f32) -> anyhow::Result<()>;
    fn set_z_order(&mut self, z_order: ZOrder) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceCall {
    Rect(Rect),
    Opacity(f32),
    ZOrder(ZOrder),
}

/// Surface that records every call, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
}

impl RecordingSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn rects(&self) -> Vec<Rect> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Rect(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn last_rect(&self) -> Option<Rect> {
        self.rects().last().copied()
    }

    pub fn last_opacity(&self) -> Option<f32> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SurfaceCall::Opacity(o) => Some(o),
            _ => None,
        })
    }

    fn push(&self, call: SurfaceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl WindowSurface for RecordingSurface {
    fn set_rect(&mut self, rect: Rect) -> anyhow::Result<()> {
        self.push(SurfaceCall::Rect(rect));
        Ok(())
    }

    fn set_opacity(&mut self, opacity: f32) -> anyhow::Result<()> {
        self.push(SurfaceCall::Opacity(opacity));
        Ok(())
    }

    fn set_z_order(&mut self, z_order: ZOrder) -> anyhow::Result<()> {
        self.push(SurfaceCall::ZOrder(z_order));
        Ok(())
    }
}

/// Drives an eframe root viewport through `ViewportCommand`s.
///
/// egui has no window-opacity command; the current opacity is published
/// through [`EguiSurface::opacity_handle`] for the host to fade its panel, and
/// on Windows is also applied to the HWND as a layered-window alpha.
pub struct EguiSurface {
    ctx: egui::Context,
    opacity: Arc<AtomicU32>,
    #[cfg(windows)]
    hwnd: Option<isize>,
}

impl EguiSurface {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            opacity: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            #[cfg(windows)]
            hwnd: None,
        }
    }

    /// Attach the native window handle (see [`hwnd_of`]).
    #[cfg(windows)]
    pub fn with_hwnd(mut self, hwnd: Option<isize>) -> Self {
        self.hwnd = hwnd;
        self
    }

    pub fn opacity_handle(&self) -> OpacityHandle {
        OpacityHandle(Arc::clone(&self.opacity))
    }

    fn points(&self, px: i32) -> f32 {
        px as f32 / self.ctx.pixels_per_point().max(0.1)
    }
}

#[derive(Debug, Clone)]
pub struct OpacityHandle(Arc<AtomicU32>);

impl OpacityHandle {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl WindowSurface for EguiSurface {
    fn set_rect(&mut self, rect: Rect) -> anyhow::Result<()> {
        let pos = egui::pos2(self.points(rect.x), self.points(rect.y));
        let size = egui::vec2(self.points(rect.width), self.points(rect.height));
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::OuterPosition(pos));
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::InnerSize(size));
        Ok(())
    }

    fn set_opacity(&mut self, opacity: f32) -> anyhow::Result<()> {
        let opacity = opacity.clamp(0.0, 1.0);
        self.opacity.store(opacity.to_bits(), Ordering::Relaxed);
        #[cfg(windows)]
        if let Some(hwnd) = self.hwnd {
            win::set_layered_alpha(hwnd, opacity)?;
        }
        self.ctx.request_repaint();
        Ok(())
    }

    fn set_z_order(&mut self, z_order: ZOrder) -> anyhow::Result<()> {
        let level = match z_order {
            ZOrder::AlwaysOnTop => egui::WindowLevel::AlwaysOnTop,
            ZOrder::Normal | ZOrder::Raised => egui::WindowLevel::Normal,
        };
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::WindowLevel(level));
        #[cfg(windows)]
        if let (ZOrder::Raised, Some(hwnd)) = (z_order, self.hwnd) {
            win::raise_without_focus(hwnd)?;
        }
        Ok(())
    }
}

/// Extract the HWND of an eframe [`eframe::Frame`] as an integer handle.
#[cfg(windows)]
pub fn hwnd_of(frame: &eframe::Frame) -> Option<isize> {
    use raw_window_handle::{HasWindowHandle, RawWindowHandle};

    frame
        .window_handle()
        .ok()
        .and_then(|wh| match wh.as_raw() {
            RawWindowHandle::Win32(handle) => Some(handle.hwnd.get()),
            _ => None,
        })
}

#[cfg(windows)]
mod win {
    use windows::Win32::Foundation::{COLORREF, HWND};
    use windows::Win32::UI::WindowsAndMessaging::{
        GetWindowLongW, SetLayeredWindowAttributes, SetWindowLongW, SetWindowPos, GWL_EXSTYLE,
        HWND_TOP, LWA_ALPHA, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, WS_EX_LAYERED,
    };

    fn hwnd(raw: isize) -> HWND {
        HWND(raw as *mut core::ffi::c_void)
    }

    pub fn set_layered_alpha(raw: isize, opacity: f32) -> anyhow::Result<()> {
        let hwnd = hwnd(raw);
        unsafe {
            let style = GetWindowLongW(hwnd, GWL_EXSTYLE);
            if style & WS_EX_LAYERED.0 as i32 == 0 {
                SetWindowLongW(hwnd, GWL_EXSTYLE, style | WS_EX_LAYERED.0 as i32);
            }
            SetLayeredWindowAttributes(hwnd, COLORREF(0), (opacity * 255.0).round() as u8, LWA_ALPHA)?;
        }
        Ok(())
    }

    pub fn raise_without_focus(raw: isize) -> anyhow::Result<()> {
        unsafe {
            SetWindowPos(
                hwnd(raw),
                HWND_TOP,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }
}
