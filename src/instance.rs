use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

/// Exclusive advisory lock held for the lifetime of the process.
///
/// Only one process may mutate the sync repository at a time. The lock file
/// holds the owner's PID while locked. It is emptied and unlocked on drop but
/// never deleted, so every process always contends on the same inode.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: Utf8PathBuf,
}

impl InstanceLock {
    /// Try to take the lock. `Ok(None)` means another instance holds it.
    pub fn acquire(path: &Utf8Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Not truncated before locking so the owner's PID survives a failed attempt
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                tracing::warn!("Another instance holds {}", path);
                return Ok(None);
            }
            return Err(e);
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        tracing::debug!("Acquired instance lock {}", path);
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}
