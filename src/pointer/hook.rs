//! Process-wide low-level mouse hook (WH_MOUSE_LL) on a dedicated thread.
//!
//! The hook proc cannot capture state, so the active sender lives in a
//! process-global dispatch slot. Only one hook source may be installed at a
//! time.

#[cfg(not(windows))]
use anyhow::anyhow;
use std::sync::mpsc::Sender;

use super::{PointerSource, RawPointer};

#[cfg(windows)]
struct HookThread {
    thread_id: u32,
    done_rx: std::sync::mpsc::Receiver<()>,
    join: std::thread::JoinHandle<()>,
}

#[cfg(windows)]
#[derive(Default)]
pub struct HookSource {
    hook_thread: Option<HookThread>,
}

#[cfg(windows)]
unsafe impl Send for HookSource {}

#[cfg(windows)]
impl PointerSource for HookSource {
    fn name(&self) -> &'static str {
        "mouse-ll-hook"
    }

    fn install(&mut self, sender: Sender<RawPointer>) -> anyhow::Result<()> {
        use anyhow::anyhow;
        use std::time::Duration;
        use windows::Win32::System::LibraryLoader::GetModuleHandleW;
        use windows::Win32::System::Threading::GetCurrentThreadId;
        use windows::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, GetMessageW, PeekMessageW, SetWindowsHookExW, TranslateMessage,
            UnhookWindowsHookEx, MSG, PM_NOREMOVE, WH_MOUSE_LL,
        };

        if self.hook_thread.is_some() {
            return Ok(());
        }

        hook_dispatch().set_sender(Some(sender));
        hook_dispatch().set_enabled(true);

        // install() only returns once the hook thread reports readiness.
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<anyhow::Result<u32>>(1);
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("edge-dock-hook".to_string())
            .spawn(move || {
                let mut msg = MSG::default();
                // Force creation of the thread's message queue.
                unsafe {
                    let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                }
                let thread_id = unsafe { GetCurrentThreadId() };

                let hmodule = match unsafe { GetModuleHandleW(None) } {
                    Ok(h) => h,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e)));
                        return;
                    }
                };
                let mouse_hook = match unsafe {
                    SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), hmodule, 0)
                } {
                    Ok(h) if !h.0.is_null() => h,
                    Ok(_) => {
                        let _ = ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                        return;
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(thread_id));

                loop {
                    let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                    // 0 is WM_QUIT, -1 is an error.
                    if r.0 == 0 || r.0 == -1 {
                        break;
                    }
                    unsafe {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                unsafe {
                    let _ = UnhookWindowsHookEx(mouse_hook);
                }
                let _ = done_tx.send(());
            })?;

        let thread_id = match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(id)) => id,
            Ok(Err(err)) => {
                hook_dispatch().clear();
                let _ = join.join();
                return Err(err);
            }
            Err(_) => {
                hook_dispatch().clear();
                return Err(anyhow!("hook thread did not signal readiness"));
            }
        };

        self.hook_thread = Some(HookThread {
            thread_id,
            done_rx,
            join,
        });
        Ok(())
    }

    fn uninstall(&mut self, budget: std::time::Duration) -> anyhow::Result<()> {
        use anyhow::anyhow;
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT};

        // No new samples once dispatch is cleared, even before the thread exits.
        hook_dispatch().clear();

        if let Some(th) = self.hook_thread.take() {
            unsafe {
                let _ = PostThreadMessageW(th.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            match th.done_rx.recv_timeout(budget) {
                Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    let _ = th.join.join();
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    return Err(anyhow!("hook thread did not exit"));
                }
            }
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.hook_thread.is_some()
    }
}

#[cfg(not(windows))]
#[derive(Default)]
pub struct HookSource;

#[cfg(not(windows))]
impl PointerSource for HookSource {
    fn name(&self) -> &'static str {
        "mouse-ll-hook"
    }

    fn install(&mut self, _sender: Sender<RawPointer>) -> anyhow::Result<()> {
        Err(anyhow!("low-level mouse hooks are not supported on this platform"))
    }

    fn uninstall(&mut self, _budget: std::time::Duration) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

#[cfg(windows)]
struct HookDispatch {
    enabled: std::sync::atomic::AtomicBool,
    sender: std::sync::Mutex<Option<Sender<RawPointer>>>,
}

#[cfg(windows)]
impl HookDispatch {
    fn set_enabled(&self, enabled: bool) {
        self.enabled
            .store(enabled, std::sync::atomic::Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Acquire)
    }

    fn set_sender(&self, sender: Option<Sender<RawPointer>>) {
        if let Ok(mut guard) = self.sender.lock() {
            *guard = sender;
        }
    }

    fn clear(&self) {
        self.set_enabled(false);
        self.set_sender(None);
    }

    fn forward(&self, raw: RawPointer) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(guard) = self.sender.lock() {
            if let Some(sender) = guard.as_ref() {
                let _ = sender.send(raw);
            }
        }
    }
}

#[cfg(windows)]
static HOOK_DISPATCH: once_cell::sync::OnceCell<HookDispatch> = once_cell::sync::OnceCell::new();

#[cfg(windows)]
fn hook_dispatch() -> &'static HookDispatch {
    HOOK_DISPATCH.get_or_init(|| HookDispatch {
        enabled: std::sync::atomic::AtomicBool::new(false),
        sender: std::sync::Mutex::new(None),
    })
}

#[cfg(windows)]
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: windows::Win32::Foundation::WPARAM,
    l_param: windows::Win32::Foundation::LPARAM,
) -> windows::Win32::Foundation::LRESULT {
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, HC_ACTION, HHOOK, MSLLHOOKSTRUCT, WM_LBUTTONDOWN, WM_MOUSEMOVE,
        WM_RBUTTONDOWN,
    };

    if n_code == HC_ACTION as i32 {
        let msg = w_param.0 as u32;
        if msg == WM_MOUSEMOVE || msg == WM_LBUTTONDOWN || msg == WM_RBUTTONDOWN {
            let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
            let raw = if msg == WM_MOUSEMOVE {
                RawPointer::moved(info.pt.x, info.pt.y)
            } else {
                RawPointer::pressed(info.pt.x, info.pt.y)
            };
            hook_dispatch().forward(raw);
        }
    }

    // Observe only; never consume input.
    CallNextHookEx(HHOOK(std::ptr::null_mut()), n_code, w_param, l_param)
}
