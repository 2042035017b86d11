use crate::source::MemorySource;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// largest single transfer, the old DOS write ceiling
pub const MAX_TRANSFER: usize = 0xFFFF;

/// bytes of each chunk shown in the debug log
const PREVIEW_LEN: usize = 16;

/// window of physical memory to dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// absolute start address
    pub offset:     u32,

    /// length in bytes
    pub size:       u32,
}

impl Region {
    pub fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }
}

/// real-mode `segment:offset` view of a linear address, display only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealModeAddress {
    pub segment:    u32,
    pub offset:     u16,
}

impl RealModeAddress {
    pub fn from_linear(addr: u64) -> Self {
        Self {
            segment: (addr / 16) as u32,
            offset: (addr % 16) as u16,
        }
    }
}

impl fmt::Display for RealModeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.segment, self.offset)
    }
}

/// progress line shown before anything is opened
pub fn describe(region: Region, path: &Path) -> String {
    format!(
        "Dumping BIOS @ {} with size {:08X}h to {}",
        RealModeAddress::from_linear(region.offset.into()),
        region.size,
        path.display()
    )
}

/// dump `region` into a freshly created (or truncated) file at `path`
///
/// nothing is rolled back on failure, a partial file may be left behind.
pub fn dump<M: MemorySource>(mem: &mut M, region: Region, path: &Path) -> Result<u64> {
    let mut out = File::create(path)
        .with_context(|| format!("Error opening output file {}", path.display()))?;

    let written = copy_region(mem, region, &mut out)?;

    // File has no fallible close, sync_all is where a deferred write error shows up
    out.sync_all()
        .with_context(|| format!("Error closing output file {}", path.display()))?;

    info!("wrote {:#x} bytes to {}", written, path.display());
    Ok(written)
}

/// copy `region` out of `mem` into `out`, at most MAX_TRANSFER bytes at a time
pub fn copy_region<M, W>(mem: &mut M, region: Region, out: &mut W) -> Result<u64>
where
    M: MemorySource + ?Sized,
    W: Write + ?Sized,
{
    let size = u64::from(region.size);
    let mut buf = vec![0u8; chunk_len(size, 0)];
    let mut written: u64 = 0;

    while written < size {
        let len = chunk_len(size, written);
        let addr = u64::from(region.offset) + written;
        let chunk = &mut buf[..len];

        mem.read_at(addr, chunk)
            .with_context(|| format!("Error reading memory at {}", RealModeAddress::from_linear(addr)))?;

        debug!(
            "{} [{:#x}..{:#x}) {}",
            RealModeAddress::from_linear(addr),
            addr,
            addr + len as u64,
            hex::encode(&chunk[..len.min(PREVIEW_LEN)])
        );

        out.write_all(chunk).context("Error writing to output file")?;
        written += len as u64;
    }

    Ok(written)
}

fn chunk_len(size: u64, written: u64) -> usize {
    size.saturating_sub(written).min(MAX_TRANSFER as u64) as usize
}
