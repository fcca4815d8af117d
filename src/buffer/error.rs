use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer is closed")]
    BufferClosed,

    #[error("Buffer is full")]
    BufferFull,

    #[error("Timed out waiting for buffer space")]
    SendTimeout,

    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },
}

impl BufferError {
    /// True for rejections caused by capacity rather than shutdown.
    pub fn is_overflow(&self) -> bool {
        matches!(self, BufferError::BufferFull | BufferError::SendTimeout)
    }
}
