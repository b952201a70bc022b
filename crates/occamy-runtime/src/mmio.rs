// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-mapped control window
//!
//! Maps the SoC control window into the host process so the runtime can
//! drive real silicon. Two device files are supported:
//!
//! - `/dev/mem` with the physical base from [`occamy_soc::memmap`]
//! - a UIO node (`/dev/uioN`) exposing the window at offset 0
//!
//! Unsafe code is confined to `mmap`/`munmap` and the volatile accesses.

use crate::error::{Result, RuntimeError};
use crate::regfile::RegisterFile;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Mapped control window
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    path: PathBuf,
}

impl MappedRegion {
    /// Map `size` bytes of `path` starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device file cannot be opened
    /// - `size` is zero
    /// - `mmap` fails
    pub fn map(path: impl AsRef<Path>, offset: u64, size: usize) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Mapping control window: {} @ {offset:#x}", path.display());

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        if size == 0 {
            return Err(RuntimeError::register(0, "control window size is 0"));
        }

        // SAFETY: mmap of a device file:
        // - fd is valid (just opened, kept alive in `_file` for the mapping's lifetime)
        // - size is non-zero (checked above)
        // - READ|WRITE + SHARED is what device memory requires
        // - the pointer is only handed out through bounds-checked accessors
        // - unmapped exactly once in Drop
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                offset,
            )
        }
        .map_err(|e| RuntimeError::register(0, format!("mmap of {} failed: {e}", path.display())))?;

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| RuntimeError::register(0, "mmap returned a null pointer"))?;

        tracing::info!(
            "Mapped control window {} ({} KB at {ptr:p})",
            path.display(),
            size / 1024
        );

        Ok(Self {
            ptr,
            size,
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Map the window through `/dev/mem` at its physical address.
    ///
    /// # Errors
    ///
    /// Same as [`MappedRegion::map`]; opening `/dev/mem` needs root.
    pub fn map_physical() -> Result<Self> {
        Self::map(
            "/dev/mem",
            occamy_soc::memmap::CTRL_WINDOW_PHYS,
            occamy_soc::memmap::CTRL_WINDOW_SIZE,
        )
    }

    /// Get region size
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Device file backing the mapping
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset % 4 != 0 {
            return Err(RuntimeError::register(offset, "misaligned 32-bit access"));
        }
        if offset + 4 > self.size {
            return Err(RuntimeError::register(
                offset,
                format!("out of bounds, limit={:#x}", self.size),
            ));
        }
        Ok(())
    }
}

impl RegisterFile for MappedRegion {
    fn read32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        // SAFETY: volatile read from the mapped window.
        // - offset + 4 <= size and offset is 4-byte aligned (checked above)
        // - ptr is valid for `size` bytes (successful mmap, not yet unmapped)
        // - volatile: the hardware changes these registers behind our back
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };
        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");
        // SAFETY: volatile write to the mapped window.
        // - offset + 4 <= size and offset is 4-byte aligned (checked above)
        // - ptr is valid for `size` bytes
        // - volatile: writes trigger hardware side effects and must not be elided
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        tracing::debug!("Unmapping control window {}", self.path.display());
        // SAFETY: ptr/size are exactly what mmap returned/received in map();
        // Drop runs once and no references into the mapping outlive self.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: Send - the mapping is process-wide and owned exclusively by this value;
// moving it between threads does not invalidate it.
unsafe impl Send for MappedRegion {}

// SAFETY: Sync - every access is a single bounds-checked volatile 32-bit load or
// store; the hardware serialises concurrent register accesses.
unsafe impl Sync for MappedRegion {}
