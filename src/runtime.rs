//! Process lifetime: waiting for SIGINT/SIGTERM and releasing resources in
//! reverse acquisition order.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::error::{Error, Result};

/// How often the main thread checks the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shutdown flag shared with the signal handler.
///
/// The handler only stores `true`; everything else happens on the thread
/// blocked in [`Shutdown::wait`].
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT and SIGTERM to this flag.
    pub fn install_signal_handlers(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.requested)).map_err(Error::Signal)?;
        }
        Ok(())
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Block until shutdown is requested, checking once per `interval`.
    pub fn wait(&self, interval: Duration) {
        while !self.is_requested() {
            thread::sleep(interval);
        }
    }
}

/// Resources held for the life of the process.
///
/// Dropping (or [`release`](Self::release)) frees them last-in first-out, so
/// drivers go before the synthesizer they feed.
#[derive(Default)]
pub struct ResourceStack {
    resources: Vec<(&'static str, Box<dyn Any>)>,
}

impl ResourceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: 'static>(&mut self, name: &'static str, resource: T) {
        log::debug!("[Session] Acquired {name}");
        self.resources.push((name, Box::new(resource)));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn release(&mut self) {
        while let Some((name, resource)) = self.resources.pop() {
            drop(resource);
            log::debug!("[Session] Released {name}");
        }
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    struct DropProbe {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn test_wait_returns_after_request() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        let interval = Duration::from_millis(20);

        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.request();
        });
        shutdown.wait(interval);
        handle.join().unwrap();

        assert!(shutdown.is_requested());
        assert!(
            start.elapsed() < Duration::from_millis(50) + interval * 10,
            "wait should end within one polling interval of the request"
        );
    }

    #[test]
    fn test_wait_already_requested() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let start = Instant::now();
        shutdown.wait(POLL_INTERVAL);
        assert!(start.elapsed() < POLL_INTERVAL);
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_sets_flag() {
        let shutdown = Shutdown::new();
        shutdown.install_signal_handlers().unwrap();
        assert!(!shutdown.is_requested());

        signal_hook::low_level::raise(SIGTERM).unwrap();
        shutdown.wait(Duration::from_millis(10));
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_resources_released_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = ResourceStack::new();
        for name in ["synthesizer", "audio driver", "MIDI driver"] {
            stack.push(name, DropProbe { name, log: Arc::clone(&log) });
        }
        assert_eq!(stack.len(), 3);

        drop(stack);
        assert_eq!(*log.lock().unwrap(), vec!["MIDI driver", "audio driver", "synthesizer"]);
        assert_eq!(Arc::strong_count(&log), 1, "no probe left alive");
    }

    #[test]
    fn test_release_is_idempotent() {
        let shared = Arc::new(());
        let mut stack = ResourceStack::new();
        stack.push("synthesizer", Arc::clone(&shared));
        stack.release();
        stack.release();
        assert!(stack.is_empty());
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
