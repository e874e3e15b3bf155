//! Memory-mapped transport
//!
//! Maps a PCIe BAR through its sysfs `resourceN` file, or any regular file
//! (handy for tests and register dumps), and performs bounds-checked
//! volatile word accesses on it. Out-of-range accesses are errors, never
//! panics.

use crate::error::TransportError;
use crate::transport::{check_aligned, Transport, TransportType};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use tracing::{debug, info, trace};

/// Memory-mapped register window implementing [`Transport`]
#[derive(Debug)]
pub struct MmapTransport {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    path: PathBuf,
    windows: BTreeMap<u64, u64>,
}

impl MmapTransport {
    /// Map BAR `bar` of the PCIe function at `pcie_address`
    /// (`/sys/bus/pci/devices/{pcie_address}/resource{bar}`)
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the resource cannot be opened or mapped.
    pub fn pcie_resource(pcie_address: &str, bar: usize) -> Result<Self, TransportError> {
        Self::open(format!("/sys/bus/pci/devices/{pcie_address}/resource{bar}"))
    }

    /// Map a whole file read-write
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the file cannot be opened, is empty,
    /// or mmap fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        debug!("Mapping {}", path.display());

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let size = usize::try_from(file.metadata()?.len())
            .map_err(|_| TransportError::invalid_access("resource larger than the address space"))?;
        if size == 0 {
            return Err(TransportError::invalid_access(format!(
                "{} is empty (device not enabled?)",
                path.display()
            )));
        }

        // SAFETY: mmap of a freshly opened file descriptor:
        // - size is non-zero and equals the file length
        // - PROT_READ|PROT_WRITE with MAP_SHARED so writes reach the device
        // - offset 0, the fd is kept open in `_file` for the mapping's lifetime
        // - the mapping is released exactly once, in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
        }
        .map_err(|e| TransportError::Io { source: e.into() })?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| TransportError::invalid_access("mmap returned a null mapping"))?;

        info!("Mapped {} ({size:#x} bytes at {ptr:p})", path.display());

        Ok(Self {
            ptr,
            size,
            _file: file,
            path,
            windows: BTreeMap::new(),
        })
    }

    /// Declare the size of the peripheral window at `base`, reported to the
    /// version resolver at bind time
    #[must_use]
    pub fn with_window(mut self, base: u64, size: u64) -> Self {
        self.windows.insert(base, size);
        self
    }

    /// Mapped size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of a checked word access
    fn offset(&self, address: u64) -> Result<usize, TransportError> {
        check_aligned(address)?;
        let size = self.size as u64;
        match usize::try_from(address) {
            Ok(offset) if address.checked_add(4).is_some_and(|end| end <= size) => Ok(offset),
            _ => Err(TransportError::OutOfWindow { address, size }),
        }
    }
}

impl Transport for MmapTransport {
    fn read32(&mut self, address: u64) -> Result<u32, TransportError> {
        let offset = self.offset(address)?;
        // SAFETY: volatile read of a mapped register:
        // - offset + 4 <= size (checked by `offset`)
        // - offset is 4-byte aligned and mmap returns page-aligned memory
        // - volatile keeps the compiler from merging or reordering device reads
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };
        trace!("mmap read  {address:#010x} = {value:#010x}");
        Ok(value)
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<(), TransportError> {
        let offset = self.offset(address)?;
        trace!("mmap write {address:#010x} = {value:#010x}");
        // SAFETY: volatile write to a mapped register:
        // - offset + 4 <= size (checked by `offset`)
        // - offset is 4-byte aligned and mmap returns page-aligned memory
        // - `&mut self` gives exclusive access to the mapping
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }
        Ok(())
    }

    fn window_size(&self, base: u64) -> Option<u64> {
        self.windows.get(&base).copied()
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Mmap
    }
}

impl Drop for MmapTransport {
    fn drop(&mut self) {
        debug!("Unmapping {} ({:#x} bytes)", self.path.display(), self.size);
        // SAFETY: ptr and size are exactly those returned by/passed to mmap in
        // `open`, and the mapping is not used after drop
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MmapTransport owns its mapping exclusively; moving it to another
// thread does not invalidate the mapping, which is process-wide.
unsafe impl Send for MmapTransport {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mapped(len: usize) -> (tempfile::NamedTempFile, MmapTransport) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
        file.flush().unwrap();
        let transport = MmapTransport::open(file.path()).unwrap();
        (file, transport)
    }

    #[test]
    fn bounds_checked() {
        let (_file, mut t) = mapped(0x10);
        assert!(t.write32(0xC, 7).is_ok());
        assert_eq!(t.read32(0xC).unwrap(), 7);
        assert!(matches!(
            t.read32(0x10),
            Err(TransportError::OutOfWindow { address: 0x10, size: 0x10 })
        ));
        assert!(matches!(t.read32(u64::MAX - 3), Err(TransportError::OutOfWindow { .. })));
        assert!(matches!(t.write32(0x6, 0), Err(TransportError::Io { .. })));
    }

    #[test]
    fn empty_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(MmapTransport::open(file.path()), Err(TransportError::Io { .. })));
    }
}
