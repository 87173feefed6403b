//! Turns data events into display records.

use crate::error::PortError;
use crate::logbuf::{ReceivedRecord, RecordLog};
use crate::mock_port::{DataEvent, MockSerialPort};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;

/// Most bytes turned into one record.
pub const CHUNK_SIZE: usize = 16;

/// Drains a port into a [`RecordLog`], one record per chunk read.
///
/// The log's lock is held for the whole drain, so drains triggered from
/// different threads never interleave their records.
#[derive(Debug, Default)]
pub struct DisplaySink {
    log: Mutex<RecordLog>,
}

impl DisplaySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers this sink on `port` so every data event triggers a drain.
    pub fn attach(self: &Arc<Self>, port: &MockSerialPort) {
        let sink = Arc::clone(self);
        port.on_data(move |port, event| sink.on_data(port, event));
    }

    pub fn on_data(&self, port: &MockSerialPort, event: DataEvent) {
        log::trace!("{}: {event:?}", port.port_name());
        if let Err(e) = self.drain(port) {
            log::warn!("{}: drain failed: {e}", port.port_name());
        }
    }

    /// Reads until the port's buffer is empty and returns how many records
    /// were appended.
    pub fn drain(&self, port: &MockSerialPort) -> Result<usize, PortError> {
        let mut log = self.log.lock();
        let mut appended = 0;
        while port.bytes_available() > 0 {
            let mut buf = [0u8; CHUNK_SIZE];
            let n = port.read(&mut buf, 0, CHUNK_SIZE)?;
            if n == 0 {
                break;
            }
            let record = ReceivedRecord::now(&buf[..n]);
            log::trace!("{}: [{}] {}", port.port_name(), record.timestamp(), record.data());
            log.push(record);
            appended += 1;
        }
        Ok(appended)
    }

    pub fn subscribe(&self) -> Receiver<ReceivedRecord> {
        self.log.lock().subscribe()
    }

    pub fn records(&self) -> Vec<ReceivedRecord> {
        self.log.lock().entries().to_vec()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    pub fn to_text(&self) -> String {
        self.log.lock().to_text()
    }
}
