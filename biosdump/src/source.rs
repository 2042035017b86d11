use anyhow::Result;
use std::path::Path;

/// something physical memory can be read out of
pub trait MemorySource {
    /// fill all of `buf` starting at linear address `addr`
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> Result<()>;
}

#[cfg(target_os = "linux")]
pub use linux::PhysMem as DeviceMemory;

#[cfg(target_os = "linux")]
impl MemorySource for linux::PhysMem {
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.read_into(addr, buf)
    }
}

#[cfg(not(target_os = "linux"))]
pub use fallback::FileMem as DeviceMemory;

/// plain seek + read over a file, for targets without a dedicated backend
#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::MemorySource;
    use anyhow::{Context, Result};
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};
    use std::path::{Path, PathBuf};

    pub struct FileMem {
        file:   File,
        path:   PathBuf,
    }

    impl FileMem {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref().to_path_buf();
            let file = File::open(&path)
                .with_context(|| format!("Error opening memory device {}", path.display()))?;
            Ok(Self { file, path })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl MemorySource for FileMem {
        fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> Result<()> {
            self.file.seek(SeekFrom::Start(addr))?;
            self.file.read_exact(buf)
                .with_context(|| format!("read {} @ {:#x}", self.path.display(), addr))
        }
    }
}

/// open the platform's memory device (or an image file standing in for it)
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<DeviceMemory> {
    let mem = DeviceMemory::open(path)?;
    log::info!("reading memory from {}", mem.path().display());
    Ok(mem)
}
