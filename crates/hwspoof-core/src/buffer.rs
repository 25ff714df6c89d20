//! Capacity-checked output buffer shared by every generator.

use std::fmt;
use std::sync::Arc;

use crate::error::GenerateError;

/// Immutable payload shared by every descriptor that serves it.
pub type SharedBuffer = Arc<[u8]>;

/// Growable byte buffer with a hard ceiling.
///
/// Appends that would cross the ceiling fail with
/// [`GenerateError::Overflow`] and leave the buffer unchanged, so a
/// generator can never hand out a silently truncated payload.
#[derive(Debug)]
pub struct BoundedBuf {
    data: Vec<u8>,
    capacity: usize,
}

impl BoundedBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn push(&mut self, byte: u8) -> Result<(), GenerateError> {
        self.extend(&[byte])
    }

    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), GenerateError> {
        if self.data.len() + bytes.len() > self.capacity {
            return Err(self.overflow());
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn extend_u16(&mut self, value: u16) -> Result<(), GenerateError> {
        self.extend(&value.to_le_bytes())
    }

    pub fn extend_u32(&mut self, value: u32) -> Result<(), GenerateError> {
        self.extend(&value.to_le_bytes())
    }

    /// Formatted append. On overflow nothing from this call is kept.
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> Result<(), GenerateError> {
        let mark = self.data.len();
        if fmt::Write::write_fmt(self, args).is_err() {
            self.data.truncate(mark);
            return Err(self.overflow());
        }
        Ok(())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn into_shared(self) -> SharedBuffer {
        Arc::from(self.data)
    }

    fn overflow(&self) -> GenerateError {
        GenerateError::Overflow {
            capacity: self.capacity,
        }
    }
}

impl fmt::Write for BoundedBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.extend(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// An empty payload, served when generation failed.
pub fn empty() -> SharedBuffer {
    Arc::from(Vec::new())
}
