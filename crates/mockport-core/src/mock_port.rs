use crate::config::SerialConfig;
use crate::error::PortError;
use crate::generator::BurstGenerator;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Kind of data event raised once per generated burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DataEvent {
    Chars,
}

/// Callback invoked with the port that raised the event.
pub type DataListener = Arc<dyn Fn(&MockSerialPort, DataEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    session: u64,
}

struct Shared {
    cfg: SerialConfig,
    buffer: Mutex<VecDeque<u8>>,
    state: Mutex<RunState>,
    generator: Mutex<Box<dyn BurstGenerator>>,
    listeners: Mutex<Vec<DataListener>>,
}

impl Shared {
    fn is_current(&self, session: u64) -> bool {
        let state = self.state.lock();
        state.running && state.session == session
    }
}

/// A serial port that never touches hardware.
///
/// While open, a background task waits a random delay, appends a random burst
/// to the receive buffer and notifies every listener. Listeners pull the bytes
/// with [`MockSerialPort::read`].
///
/// Handles are cheap to clone. The generation task only holds a weak
/// reference, so dropping every handle stops it after its current delay.
#[derive(Clone)]
pub struct MockSerialPort {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("port_name", &self.inner.cfg.port_name)
            .field("open", &self.is_open())
            .field("bytes_available", &self.bytes_available())
            .finish()
    }
}

impl MockSerialPort {
    pub fn new(cfg: SerialConfig, generator: impl BurstGenerator) -> Self {
        Self {
            inner: Arc::new(Shared {
                cfg,
                buffer: Mutex::new(VecDeque::new()),
                state: Mutex::new(RunState::default()),
                generator: Mutex::new(Box::new(generator)),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts the generation loop on the current Tokio runtime.
    ///
    /// Does nothing if the port is already open. Outside a runtime the port
    /// stays closed and the failure is logged.
    pub fn open(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::error!("{}: open needs a Tokio runtime", self.inner.cfg.port_name);
            return;
        };
        let session = {
            let mut state = self.inner.state.lock();
            if state.running {
                log::debug!("{}: already open", self.inner.cfg.port_name);
                return;
            }
            state.running = true;
            state.session += 1;
            state.session
        };
        log::info!("{}: opened (session {session})", self.inner.cfg.port_name);
        handle.spawn(generate(SessionGuard {
            shared: Arc::downgrade(&self.inner),
            session,
        }));
    }

    /// Stops the generation loop. A delay already in progress runs out first,
    /// but no burst is generated after it.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            log::debug!("{}: already closed", self.inner.cfg.port_name);
            return;
        }
        state.running = false;
        log::info!("{}: closed", self.inner.cfg.port_name);
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Registers a listener for data events.
    ///
    /// Listeners get the raising port as an argument. One that captures a
    /// handle to this same port forms a reference cycle and the port is never
    /// freed, even after `close()`. A listener that panics is logged and
    /// skipped; the loop keeps running.
    pub fn on_data<F>(&self, listener: F)
    where
        F: Fn(&MockSerialPort, DataEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    /// Moves up to `count` bytes from the receive buffer into
    /// `buf[offset..offset + count]` and returns how many were copied.
    ///
    /// An empty buffer is not an error: it yields `Ok(0)`.
    pub fn read(&self, buf: &mut [u8], offset: usize, count: usize) -> Result<usize, PortError> {
        let end = offset
            .checked_add(count)
            .filter(|&end| end <= buf.len())
            .ok_or(PortError::OutOfRange {
                offset,
                count,
                len: buf.len(),
            })?;

        let mut queue = self.inner.buffer.lock();
        let n = count.min(queue.len());
        for (slot, byte) in buf[offset..end].iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    pub fn bytes_available(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn port_name(&self) -> &str {
        &self.inner.cfg.port_name
    }

    pub fn config(&self) -> &SerialConfig {
        &self.inner.cfg
    }

    pub(crate) fn enqueue(&self, bytes: &[u8]) {
        self.inner.buffer.lock().extend(bytes.iter().copied());
    }

    fn notify(&self, event: DataEvent) {
        let listeners = self.inner.listeners.lock().clone();
        for listener in listeners {
            let call = AssertUnwindSafe(|| listener(self, event));
            if let Err(payload) = panic::catch_unwind(call) {
                let msg = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("non-string panic");
                log::warn!("{}: data listener panicked: {msg}", self.port_name());
            }
        }
    }
}

/// Owned by a generation loop. Marks the port closed when the loop of the
/// current session goes away for any reason other than `close()`.
struct SessionGuard {
    shared: Weak<Shared>,
    session: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(inner) = self.shared.upgrade() else { return };
        let mut state = inner.state.lock();
        if state.running && state.session == self.session {
            state.running = false;
            log::warn!("{}: generation loop ended, port closed", inner.cfg.port_name);
        }
    }
}

async fn generate(guard: SessionGuard) {
    let session = guard.session;
    loop {
        let delay = match guard.shared.upgrade() {
            Some(inner) if inner.is_current(session) => inner.generator.lock().next_delay(),
            _ => break,
        };

        tokio::time::sleep(delay).await;

        let Some(inner) = guard.shared.upgrade() else { break };
        if !inner.is_current(session) {
            break;
        }
        let port = MockSerialPort { inner };
        let burst = port.inner.generator.lock().next_burst();
        log::debug!(
            "{}: burst of {} bytes after {} ms",
            port.port_name(),
            burst.len(),
            delay.as_millis()
        );
        port.enqueue(&burst);
        port.notify(DataEvent::Chars);
    }
    log::debug!("generation loop for session {session} exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{SeededBursts, DEFAULT_SEED};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn port() -> MockSerialPort {
        MockSerialPort::new(SerialConfig::new("COM5"), SeededBursts::from_seed(DEFAULT_SEED))
    }

    #[test]
    fn read_empty_returns_zero() {
        let port = port();
        let mut buf = [0u8; 16];
        assert_eq!(port.read(&mut buf, 0, 16), Ok(0));
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn read_is_fifo_and_bounded() {
        let port = port();
        port.enqueue(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf, 0, 3), Ok(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(port.bytes_available(), 2);

        assert_eq!(port.read(&mut buf, 4, 4), Ok(2));
        assert_eq!(&buf[4..6], &[4, 5]);
        assert_eq!(port.bytes_available(), 0);
    }

    #[test]
    fn read_rejects_window_past_buffer_end() {
        let port = port();
        port.enqueue(&[9; 10]);
        let mut buf = [0u8; 4];

        let err = port.read(&mut buf, 2, 3).unwrap_err();
        assert_eq!(
            err,
            PortError::OutOfRange {
                offset: 2,
                count: 3,
                len: 4
            }
        );
        assert!(port.read(&mut buf, usize::MAX, 2).is_err());
        // nothing was consumed by the failed reads
        assert_eq!(port.bytes_available(), 10);
    }

    #[test]
    fn read_rejects_window_even_when_empty() {
        let port = port();
        let mut buf = [0u8; 2];
        assert!(port.read(&mut buf, 0, 3).is_err());
    }

    #[test]
    fn close_when_never_opened_is_noop() {
        let port = port();
        port.close();
        port.close();
        assert!(!port.is_open());
    }

    #[test]
    fn debug_names_the_port() {
        let debug = format!("{:?}", port());
        assert!(debug.contains("COM5"));
    }

    fn counting(port: &MockSerialPort) -> Arc<AtomicUsize> {
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        port.on_data(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        events
    }

    #[tokio::test(start_paused = true)]
    async fn open_twice_runs_one_loop() {
        let port = port();
        let events = counting(&port);

        let mut reference = SeededBursts::from_seed(DEFAULT_SEED);
        let mut deadline = Duration::ZERO;
        for _ in 0..3 {
            deadline += reference.next_delay();
            reference.next_burst();
        }
        // the fourth delay is at least a second, so this sits between bursts
        deadline += Duration::from_millis(500);

        port.open();
        port.open();
        assert!(port.is_open());
        tokio::time::sleep(deadline).await;
        port.close();

        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_events_after_close() {
        let port = port();
        let events = counting(&port);

        port.open();
        tokio::time::sleep(Duration::from_millis(500)).await;
        port.close();
        port.close();
        assert!(!port.is_open());
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(events.load(Ordering::SeqCst), 0);
        assert_eq!(port.bytes_available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_during_pending_delay_keeps_single_loop() {
        let port = port();
        let events = counting(&port);

        let mut reference = SeededBursts::from_seed(DEFAULT_SEED);
        // drawn by the first session, which is abandoned before it fires
        let _ = reference.next_delay();
        let mut deadline = Duration::ZERO;
        for _ in 0..2 {
            deadline += reference.next_delay();
            reference.next_burst();
        }
        deadline += Duration::from_millis(500);

        port.open();
        tokio::time::sleep(Duration::from_millis(100)).await;
        port.close();
        port.open();
        tokio::time::sleep(deadline).await;
        port.close();

        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_all_handles_stops_the_loop() {
        let port = port();
        let weak = Arc::downgrade(&port.inner);
        port.open();
        drop(port);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn listener_panic_does_not_stop_bursts() {
        let port = port();
        let panicked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = panicked.clone();
        port.on_data(move |_, _| {
            if !flag.swap(true, Ordering::SeqCst) {
                panic!("listener failed");
            }
        });
        let events = counting(&port);

        port.open();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(panicked.load(Ordering::SeqCst));
        assert!(port.is_open());
        // every delay is under five seconds
        assert!(events.load(Ordering::SeqCst) >= 12);
        port.close();
    }

    #[test]
    fn runtime_shutdown_marks_port_closed() {
        let port = port();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async { port.open() });
        assert!(port.is_open());

        drop(rt);
        assert!(!port.is_open());

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async { port.open() });
        assert!(port.is_open());
        port.close();
    }

    #[test]
    fn open_outside_runtime_stays_closed() {
        let port = port();
        port.open();
        assert!(!port.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_using_the_argument_do_not_keep_port_alive() {
        let port = port();
        let drained = Arc::new(AtomicUsize::new(0));
        let total = drained.clone();
        port.on_data(move |port, _| {
            let mut buf = [0u8; 32];
            if let Ok(n) = port.read(&mut buf, 0, 32) {
                total.fetch_add(n, Ordering::SeqCst);
            }
        });
        let weak = Arc::downgrade(&port.inner);

        port.open();
        tokio::time::sleep(Duration::from_secs(20)).await;
        port.close();
        assert!(drained.load(Ordering::SeqCst) > 0);

        drop(port);
        assert!(weak.upgrade().is_none());
    }
}
