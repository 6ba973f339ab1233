use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use core_types::MessageId;
use sha2::{Digest, Sha256};

const HASH_CHARS: usize = 32;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk store of decoded remote images, one PNG file per
/// `(owner, locator)`.
///
/// Writers never touch the final path directly: each writes a private temp
/// file next to it and renames it into place, so concurrent writers of one
/// key cannot expose a partial file.
#[derive(Clone, Debug)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, owner: MessageId, locator: &str) -> PathBuf {
        self.dir.join(file_name(owner, locator))
    }

    /// `Ok(None)` when nothing is cached for the key.
    pub fn load(&self, owner: MessageId, locator: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(owner, locator)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn store(&self, owner: MessageId, locator: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(owner, locator);
        let temp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name(owner, locator),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let written = write_file(&temp, bytes).and_then(|()| fs::rename(&temp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        Ok(target)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn file_name(owner: MessageId, locator: &str) -> String {
    let digest = Sha256::digest(locator.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(HASH_CHARS);
    format!("{owner}_{hex}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable_and_owner_scoped() {
        let cache = DiskCache::new("/cache");
        let a = cache.path_for(1, "https://x.example/a.png");
        assert_eq!(a, cache.path_for(1, "https://x.example/a.png"));
        assert_ne!(a, cache.path_for(2, "https://x.example/a.png"));
        assert_ne!(a, cache.path_for(1, "https://x.example/b.png"));
        let name = a.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("1_"));
        assert_eq!(name.len(), "1_".len() + HASH_CHARS + ".png".len());
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = DiskCache::new(dir.path().join("images"));
        assert!(cache.load(7, "u").expect("load").is_none());
        let path = cache.store(7, "u", b"png").expect("store");
        assert_eq!(cache.load(7, "u").expect("load").as_deref(), Some(&b"png"[..]));
        cache.store(7, "u", b"png2").expect("overwrite");
        assert_eq!(fs::read(path).expect("read"), b"png2");
        let entries = fs::read_dir(cache.dir()).expect("dir").count();
        assert_eq!(entries, 1, "temp files must not be left behind");
    }
}
