//! Bus transport abstraction
//!
//! The accessor engine only ever issues aligned 32-bit reads and writes.
//! Narrower registers are reached through the word that contains them.

use crate::error::TransportError;
use std::fmt::Debug;

/// Word-level bus access: one implementation per way of reaching the gateware
pub trait Transport: Debug + Send {
    /// Read the 32-bit word at a byte address (4-byte aligned)
    ///
    /// # Errors
    ///
    /// Returns the bus failure (timeout, NACK, out-of-window, I/O).
    fn read32(&mut self, address: u64) -> Result<u32, TransportError>;

    /// Write the 32-bit word at a byte address (4-byte aligned)
    ///
    /// # Errors
    ///
    /// Returns the bus failure (timeout, NACK, out-of-window, I/O).
    fn write32(&mut self, address: u64, value: u32) -> Result<(), TransportError>;

    /// Size of the peripheral window starting at `base`, if the transport knows it
    fn window_size(&self, _base: u64) -> Option<u64> {
        None
    }

    /// Transport type for logs and diagnostics
    fn transport_type(&self) -> TransportType;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read32(&mut self, address: u64) -> Result<u32, TransportError> {
        (**self).read32(address)
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<(), TransportError> {
        (**self).write32(address, value)
    }

    fn window_size(&self, base: u64) -> Option<u64> {
        (**self).window_size(base)
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// In-memory register file, no hardware required
    Simulated,

    /// Memory-mapped PCIe BAR or file
    Mmap,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => write!(f, "Simulated"),
            Self::Mmap => write!(f, "Mmap"),
        }
    }
}

/// Reject addresses that are not word-aligned
pub(crate) fn check_aligned(address: u64) -> Result<(), TransportError> {
    if address % 4 != 0 {
        return Err(TransportError::invalid_access(format!(
            "unaligned word access at {address:#x}"
        )));
    }
    Ok(())
}
