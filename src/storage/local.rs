use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use crate::error::Result;

use super::ByteSource;

/// A local file accessed with positioned reads, used as the local-disk
/// implementation of [`ByteSource`] for CDB files.
pub struct LocalByteSource {
    path: PathBuf,
}

impl LocalByteSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        LocalByteSource { path: path.into() }
    }
}

impl ByteSource for LocalByteSource {
    fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    #[cfg(unix)]
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    #[cfg(not(unix))]
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
