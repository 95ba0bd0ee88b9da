//! Backing storage and memory mapping for a shared region

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{Result, ShmStatsError};

/// A writable, file-backed memory mapping owned by the writer process
#[derive(Debug)]
pub struct RegionMapping {
    path: PathBuf,
    mmap: MmapMut,
    _file: std::fs::File,
    size: usize,
}

impl RegionMapping {
    /// Create (or replace) the backing file at `path` and map it writable
    ///
    /// Truncating guarantees a zero-filled region, so a restart on the same
    /// path carries no residue from a previous catalog.
    pub fn create(path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ShmStatsError::validation("region size must be non-zero"));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| ShmStatsError::from_io(e, "failed to create region file"))?;
        file.set_len(size as u64)
            .map_err(|e| ShmStatsError::from_io(e, "failed to size region file"))?;
        let mmap = unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(&file)
                .map_err(|e| ShmStatsError::from_io(e, "failed to map region"))?
        };
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            _file: file,
            size,
        })
    }

    /// Map an existing region file read-only (reader side)
    pub fn open_readonly(path: &Path) -> Result<Mmap> {
        let file = std::fs::File::open(path)
            .map_err(|e| ShmStatsError::from_io(e, "failed to open region file"))?;
        unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|e| ShmStatsError::from_io(e, "failed to map region"))
        }
    }

    /// Base pointer of the mapping
    ///
    /// # Safety
    /// Caller must uphold the single-writer discipline for all writes
    /// through this pointer.
    pub unsafe fn base_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// The whole mapped region as bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Mapped size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush dirty pages to the backing file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| ShmStatsError::from_io(e, "failed to flush region"))
    }

    /// Remove the backing file so readers see a clean absence
    pub fn unlink(&self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .map_err(|e| ShmStatsError::from_io(e, "failed to remove region file"))
    }
}
