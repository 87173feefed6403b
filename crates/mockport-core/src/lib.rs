//! Core functionalities: a simulated serial port, its burst generator, and the
//! sink that turns received bytes into display records.

pub mod config;
pub mod error;
pub mod generator;
pub mod logbuf;
pub mod mock_port;
pub mod sink;

pub use config::SerialConfig;
pub use error::PortError;
pub use generator::{BurstGenerator, SeededBursts, DEFAULT_SEED};
pub use logbuf::{ReceivedRecord, RecordLog};
pub use mock_port::{DataEvent, MockSerialPort};
pub use sink::{DisplaySink, CHUNK_SIZE};

// serial settings types, re-exported so callers need not depend on serialport
pub use serialport::{DataBits, FlowControl, Parity, StopBits};
