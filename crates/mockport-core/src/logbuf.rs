use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// `hh:mm:ss.fff AM/PM`, local time.
pub const TIMESTAMP_FORMAT: &str = "%I:%M:%S%.3f %p";

/// One chunk of received bytes as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    timestamp: String,
    data: String,
}

impl ReceivedRecord {
    /// Stamps `bytes` with the current local time.
    pub fn now(bytes: &[u8]) -> Self {
        Self::at(Local::now(), bytes)
    }

    pub fn at(time: DateTime<Local>, bytes: &[u8]) -> Self {
        Self {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            data: hex_display(bytes),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Uppercase hex with one space between bytes, e.g. `"12 34 56"`.
pub fn hex_display(bytes: &[u8]) -> String {
    let digits = hex::encode_upper(bytes);
    let mut out = String::with_capacity(digits.len() + bytes.len().saturating_sub(1));
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(pair.iter().map(|&b| b as char));
    }
    out
}

/// Append-only, ordered list of records.
///
/// Every record pushed after [`RecordLog::subscribe`] is also sent to that
/// subscriber, in push order. Subscribers that hang up are dropped.
#[derive(Debug, Default)]
pub struct RecordLog {
    entries: Vec<ReceivedRecord>,
    subscribers: Vec<Sender<ReceivedRecord>>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ReceivedRecord) {
        self.subscribers
            .retain(|tx| tx.send(record.clone()).is_ok());
        self.entries.push(record);
    }

    pub fn subscribe(&mut self) -> Receiver<ReceivedRecord> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn entries(&self) -> &[ReceivedRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            result.push_str(&format_row(entry));
            result.push('\n');
        }
        result
    }
}

/// `[timestamp] data`
pub fn format_row(record: &ReceivedRecord) -> String {
    format!("[{}] {}", record.timestamp, record.data)
}
