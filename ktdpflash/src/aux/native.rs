//! Native AUX channel implementation using DRM AUX device nodes.
//!
//! On Linux the kernel exposes each DisplayPort AUX channel as a
//! `/dev/drm_dp_aux*` character device whose file offset is the DPCD
//! address, so positional reads and writes map directly onto register
//! access.

use {
    crate::{
        aux::AuxChannel,
        error::{Error, Result},
    },
    log::trace,
    std::{
        fs::{File, OpenOptions},
        os::unix::fs::FileExt,
        path::{Path, PathBuf},
    },
};

/// AUX channel backed by a `/dev/drm_dp_aux*` device node.
pub struct DrmDpAuxDev {
    file: File,
    name: String,
}

impl DrmDpAuxDev {
    /// Open an AUX device node for register access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            name: path.display().to_string(),
        })
    }

    /// List candidate AUX device nodes on this system.
    ///
    /// Returns every `/dev/drm_dp_aux*` node, sorted. Not every node has
    /// an updatable converter behind it; callers are expected to probe.
    pub fn list_devices() -> Result<Vec<PathBuf>> {
        let mut nodes = Vec::new();
        for entry in std::fs::read_dir("/dev")? {
            let entry = entry?;
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with("drm_dp_aux")
            {
                nodes.push(entry.path());
            }
        }
        nodes.sort();
        Ok(nodes)
    }
}

impl AuxChannel for DrmDpAuxDev {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        trace!("aux read {:#07x} len {}", address, buf.len());
        self.file
            .read_exact_at(buf, u64::from(address))
            .map_err(Error::Io)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        trace!("aux write {:#07x} len {}", address, data.len());
        self.file
            .write_all_at(data, u64::from(address))
            .map_err(Error::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
