use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;

use super::{PointerSource, RawPointer};

/// Scriptable source for tests; paired with a [`MockPointerHandle`].
#[derive(Clone)]
pub struct MockPointerSource {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    install_count: AtomicUsize,
    uninstall_count: AtomicUsize,
    fail_install: AtomicBool,
    sender: Mutex<Option<Sender<RawPointer>>>,
}

impl MockPointerSource {
    pub fn new() -> (Self, MockPointerHandle) {
        let state = Arc::new(MockState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            MockPointerHandle { state },
        )
    }

    /// A source whose `install` always fails.
    pub fn failing() -> (Self, MockPointerHandle) {
        let (source, handle) = Self::new();
        source.state.fail_install.store(true, Ordering::SeqCst);
        (source, handle)
    }
}

impl PointerSource for MockPointerSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn install(&mut self, sender: Sender<RawPointer>) -> anyhow::Result<()> {
        if self.state.fail_install.load(Ordering::SeqCst) {
            return Err(anyhow!("mock install failure"));
        }
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_none() {
            self.state.install_count.fetch_add(1, Ordering::SeqCst);
            *guard = Some(sender);
        }
        Ok(())
    }

    fn uninstall(&mut self, _budget: Duration) -> anyhow::Result<()> {
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            self.state.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        *guard = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }
}

pub struct MockPointerHandle {
    state: Arc<MockState>,
}

impl MockPointerHandle {
    pub fn install_count(&self) -> usize {
        self.state.install_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.uninstall_count.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        self.state
            .sender
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    pub fn emit(&self, raw: RawPointer) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|sender| sender.send(raw).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn move_to(&self, x: i32, y: i32) -> bool {
        self.emit(RawPointer::moved(x, y))
    }

    pub fn press_at(&self, x: i32, y: i32) -> bool {
        self.emit(RawPointer::pressed(x, y))
    }
}
