//! Simulated bus
//!
//! A sparse in-memory word store standing in for the gateware. Every clone
//! shares the same state, so a test can hand one clone to a binding and keep
//! another to preload registers, inject faults and inspect the traffic.
//!
//! ```text
//! test ── SimulatedBus ─┐
//!                       ├── Arc<Mutex<BusState>>  memory / windows / faults / log
//! binding ─ SimulatedBus┘
//! ```

use crate::error::TransportError;
use crate::transport::{check_aligned, Transport, TransportType};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// One completed bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    /// Word read
    Read {
        /// Word address
        address: u64,
        /// Value returned
        value: u32,
    },
    /// Word write
    Write {
        /// Word address
        address: u64,
        /// Value written
        value: u32,
    },
}

impl BusAccess {
    /// Whether the access was a write
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Failure injected at an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Access times out
    Timeout,
    /// Access is rejected
    Nack,
}

#[derive(Debug, Default)]
struct BusState {
    memory: HashMap<u64, u32>,
    windows: BTreeMap<u64, u64>,
    faults: HashMap<u64, Fault>,
    log: Vec<BusAccess>,
}

impl BusState {
    fn check(&self, address: u64) -> Result<(), TransportError> {
        check_aligned(address)?;
        match self.faults.get(&address) {
            Some(Fault::Timeout) => return Err(TransportError::Timeout { address }),
            Some(Fault::Nack) => return Err(TransportError::Nack { address }),
            None => {}
        }
        if self.windows.is_empty() {
            return Ok(());
        }
        match self.windows.range(..=address).next_back() {
            Some((&base, &size)) if address.saturating_add(4) <= base.saturating_add(size) => Ok(()),
            Some((_, &size)) => Err(TransportError::OutOfWindow { address, size }),
            None => Err(TransportError::OutOfWindow { address, size: 0 }),
        }
    }
}

/// In-memory register file implementing [`Transport`]
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    /// Empty bus: every address reads 0 and no window is declared
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a peripheral window. Once any window exists, accesses outside
    /// all windows fail with [`TransportError::OutOfWindow`].
    #[must_use]
    pub fn with_window(self, base: u64, size: u64) -> Self {
        self.lock().windows.insert(base, size);
        self
    }

    /// Set a word without logging traffic
    pub fn poke(&self, address: u64, value: u32) {
        self.lock().memory.insert(address, value);
    }

    /// Get a word without logging traffic
    pub fn peek(&self, address: u64) -> u32 {
        self.lock().memory.get(&address).copied().unwrap_or(0)
    }

    /// Make every access to `address` fail
    pub fn inject_fault(&self, address: u64, fault: Fault) {
        self.lock().faults.insert(address, fault);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Completed accesses, oldest first
    pub fn traffic(&self) -> Vec<BusAccess> {
        self.lock().log.clone()
    }

    /// Forget the recorded traffic
    pub fn clear_traffic(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // Every mutation is a single insert or push, so a poisoned state is still whole
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SimulatedBus {
    fn read32(&mut self, address: u64) -> Result<u32, TransportError> {
        let mut state = self.lock();
        state.check(address)?;
        let value = state.memory.get(&address).copied().unwrap_or(0);
        state.log.push(BusAccess::Read { address, value });
        trace!("sim read  {address:#010x} = {value:#010x}");
        Ok(value)
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.check(address)?;
        state.memory.insert(address, value);
        state.log.push(BusAccess::Write { address, value });
        trace!("sim write {address:#010x} = {value:#010x}");
        Ok(())
    }

    fn window_size(&self, base: u64) -> Option<u64> {
        self.lock().windows.get(&base).copied()
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Simulated
    }
}
