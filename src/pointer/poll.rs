use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use super::{PointerSource, RawPointer};
use crate::worker::Worker;

pub trait CursorPositionProvider: Send + Sync {
    fn cursor_position(&self) -> Option<(i32, i32)>;
}

/// Global cursor position from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCursor;

impl CursorPositionProvider for SystemCursor {
    fn cursor_position(&self) -> Option<(i32, i32)> {
        get_cursor_position()
    }
}

#[cfg(windows)]
fn get_cursor_position() -> Option<(i32, i32)> {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    let mut point = POINT { x: 0, y: 0 };
    if unsafe { GetCursorPos(&mut point).is_ok() } {
        Some((point.x, point.y))
    } else {
        None
    }
}

#[cfg(not(windows))]
fn get_cursor_position() -> Option<(i32, i32)> {
    None
}

/// Fallback strategy sampling the cursor on a fixed interval. Only changed
/// positions are forwarded.
pub struct PollingSource {
    provider: Arc<dyn CursorPositionProvider>,
    interval: Duration,
    worker: Option<Worker>,
}

impl PollingSource {
    pub fn new(provider: Arc<dyn CursorPositionProvider>, interval: Duration) -> Self {
        Self {
            provider,
            interval: interval.max(Duration::from_millis(1)),
            worker: None,
        }
    }
}

impl PointerSource for PollingSource {
    fn name(&self) -> &'static str {
        "cursor-poll"
    }

    fn install(&mut self, sender: Sender<RawPointer>) -> anyhow::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        if self.provider.cursor_position().is_none() {
            return Err(anyhow!("cursor position is not available on this platform"));
        }

        let provider = Arc::clone(&self.provider);
        let interval = self.interval;
        let worker = Worker::spawn("edge-dock-poll", move |stop_rx| {
            let mut last: Option<(i32, i32)> = None;
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let Some(pos) = provider.cursor_position() else {
                    continue;
                };
                if last == Some(pos) {
                    continue;
                }
                last = Some(pos);
                if sender.send(RawPointer::moved(pos.0, pos.1)).is_err() {
                    break;
                }
            }
        })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn uninstall(&mut self, budget: Duration) -> anyhow::Result<()> {
        if let Some(worker) = self.worker.take() {
            worker
                .stop(budget)
                .map_err(|name| anyhow!("{name} did not stop"))?;
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.worker.is_some()
    }
}
