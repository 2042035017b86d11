use log::{debug, warn};
use nix::{errno::Errno, libc::off_t, sys::uio::pread, unistd::geteuid};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// physical memory device exposed by the kernel
pub const DEV_MEM: &str = "/dev/mem";

/// read-only handle on /dev/mem (or anything laid out like it, e.g. a saved image)
pub struct PhysMem {
    /// open handle on the device
    file:       File,

    /// where `file` was opened from
    path:       PathBuf,
}

impl PhysMem {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // CONFIG_STRICT_DEVMEM still lets root read the legacy BIOS window
        if path == Path::new(DEV_MEM) && !geteuid().is_root() {
            warn!("not running as root, reading {} will most likely be denied", DEV_MEM);
        }

        let file = File::open(&path)
            .with_context(|| format!("Error opening memory device {}", path.display()))?;
        debug!("opened {}", path.display());

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// fill `buf` with the bytes at physical address `addr`
    pub fn read_into(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let pos = addr + filled as u64;
            let off = off_t::try_from(pos)
                .with_context(|| format!("address {:#x} does not fit in off_t", pos))?;

            match pread(&self.file, &mut buf[filled..], off) {
                Ok(0) => {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
                        .with_context(|| format!("{} ends at {:#x}", self.path.display(), pos));
                },

                Ok(n) => filled += n,

                Err(Errno::EINTR) => continue,

                Err(e) => {
                    // keep the raw errno around for the exit status
                    return Err(io::Error::from(e))
                        .with_context(|| format!("pread {} @ {:#x}", self.path.display(), pos));
                },
            }
        }

        Ok(())
    }
}
