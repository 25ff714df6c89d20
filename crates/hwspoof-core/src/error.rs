/// Failure to produce a synthetic payload.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generated content exceeds capacity of {capacity} bytes")]
    Overflow { capacity: usize },
    #[error("IO error while taking snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Registration refused by a fixed-capacity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("table is full ({capacity} entries)")]
    Full { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("seek target outside [0, length]")]
    InvalidArgument,
}
