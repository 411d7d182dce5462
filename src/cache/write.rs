use std::{fs::File, io::{Seek, Write}, path::{Path, PathBuf}};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Write-then-rename wrapper for atomic cache outputs.
///
/// Bytes go to a temp file in the target's directory; `finalize` renames it over the target so
/// readers never observe a half-written artifact. Dropping without finalizing discards the temp.
pub struct PendingWrite {
    target: PathBuf,
    tmp: NamedTempFile,
}

impl PendingWrite {
    pub fn open(target: &Path) -> Result<Self> {
        let parent = target.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp = NamedTempFile::new_in(parent)?;
        Ok(Self { target: target.to_path_buf(), tmp })
    }

    pub fn target(&self) -> &Path { &self.target }

    /// Path of the temp file, for readers that need to inspect bytes before committing.
    pub fn temp_path(&self) -> &Path { self.tmp.path() }

    pub fn finalize(self) -> Result<PathBuf> {
        self.tmp.as_file().sync_all().ok(); // best-effort fsync file
        self.tmp.persist(&self.target).map_err(|e| e.error)?;
        if let Some(dir) = self.target.parent() {
            let _ = File::open(dir).and_then(|f| f.sync_all());
        }
        Ok(self.target)
    }
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tmp.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.tmp.flush()
    }
}

impl Seek for PendingWrite {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.tmp.as_file_mut().seek(pos)
    }
}

/// Atomically replaces `target` with `bytes`.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut pending = PendingWrite::open(target)?;
    pending.write_all(bytes)?;
    pending.finalize()?;
    Ok(())
}
