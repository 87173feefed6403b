use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The caller asked for a window that does not fit in its own buffer.
    #[error("read window out of range: offset {offset} + count {count} exceeds buffer length {len}")]
    OutOfRange {
        offset: usize,
        count: usize,
        len: usize,
    },
}
