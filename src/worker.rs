use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread with a stop channel and a bounded, non-deadlocking join.
#[derive(Debug)]
pub struct Worker {
    name: &'static str,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    join: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(stop_rx);
                let _ = done_tx.send(());
            })?;
        Ok(Self {
            name,
            stop_tx,
            done_rx,
            join,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the thread and wait at most `budget` for it to finish.
    ///
    /// On timeout the thread is detached and its name returned as the error.
    pub fn stop(self, budget: Duration) -> Result<(), &'static str> {
        let _ = self.stop_tx.send(());
        self.wait(budget)
    }

    /// Wait for a thread that was told to stop by other means.
    pub fn wait(self, budget: Duration) -> Result<(), &'static str> {
        match self.done_rx.recv_timeout(budget) {
            Ok(()) => {
                let _ = self.join.join();
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                if self.join.join().is_err() {
                    tracing::error!(worker = self.name, "worker thread panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::error!(worker = self.name, ?budget, "worker did not stop in time");
                Err(self.name)
            }
        }
    }
}

/// True once the stop signal arrived or the owner went away.
pub fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(mpsc::TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn stops_promptly() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = Worker::spawn("test-worker", move |stop_rx| {
            flag.store(true, Ordering::SeqCst);
            let _ = stop_rx.recv();
        })
        .unwrap();
        assert!(worker.stop(Duration::from_secs(1)).is_ok());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn reports_stalled_thread_instead_of_hanging() {
        let worker = Worker::spawn("stuck-worker", |_stop_rx| {
            std::thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
        let start = std::time::Instant::now();
        assert_eq!(worker.stop(Duration::from_millis(20)), Err("stuck-worker"));
        assert!(start.elapsed() < Duration::from_millis(250));
    }
}
