//! Disk-backed artifact storage.
//!
//! Three sibling directories under the data root: `uploads` for raw client
//! uploads, `tmp` for normalized images awaiting submission, `results` for
//! generated outputs. Only result names are ever exposed to callers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

pub struct ArtifactStore {
    uploads: PathBuf,
    tmp: PathBuf,
    results: PathBuf,
}

fn unique_name(ext: &str) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), ext)
}

impl ArtifactStore {
    pub fn open(data_dir: &Path) -> io::Result<Self> {
        let store = Self {
            uploads: data_dir.join("uploads"),
            tmp: data_dir.join("tmp"),
            results: data_dir.join("results"),
        };
        fs::create_dir_all(&store.uploads)?;
        fs::create_dir_all(&store.tmp)?;
        fs::create_dir_all(&store.results)?;
        Ok(store)
    }

    /// Persist a raw client upload; returns the path for later cleanup.
    pub fn save_upload(&self, ext: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.uploads.join(unique_name(ext));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Persist a normalized image awaiting submission to the provider.
    pub fn save_temp(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.tmp.join(unique_name("png"));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Persist a generated output; returns the image id callers retrieve it by.
    pub fn save_result(&self, bytes: &[u8]) -> io::Result<String> {
        let image_id = unique_name("png");
        fs::write(self.results.join(&image_id), bytes)?;
        Ok(image_id)
    }

    /// Resolve an image id to its stored file.
    ///
    /// Returns `None` for ids that are not plain file names (path traversal)
    /// or that don't exist on disk.
    pub fn result_path(&self, image_id: &str) -> Option<PathBuf> {
        if image_id.is_empty()
            || image_id.contains('/')
            || image_id.contains('\\')
            || image_id.contains("..")
        {
            return None;
        }
        let path = self.results.join(image_id);
        path.is_file().then_some(path)
    }

    /// Delete temp artifacts older than `ttl`. Returns the number removed.
    pub fn sweep_temp(&self, ttl: Duration) -> usize {
        sweep_dir(&self.tmp, ttl)
    }

    /// Delete result artifacts older than `ttl`. Returns the number removed.
    pub fn sweep_results(&self, ttl: Duration) -> usize {
        sweep_dir(&self.results, ttl)
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    pub fn results_dir(&self) -> &Path {
        &self.results
    }
}

/// Best-effort age-based sweep. Entries that vanish mid-walk or refuse to
/// be deleted are skipped, never escalated.
fn sweep_dir(dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let expired = modified
            .elapsed()
            .map(|age| age > ttl)
            .unwrap_or(false);
        if expired && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_roundtrip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let bytes = b"generated image bytes";
        let image_id = store.save_result(bytes).unwrap();
        assert!(image_id.ends_with(".png"));

        let path = store.result_path(&image_id).unwrap();
        assert_eq!(fs::read(path).unwrap(), bytes);
    }

    #[test]
    fn result_path_rejects_traversal_and_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        assert!(store.result_path("../../etc/passwd").is_none());
        assert!(store.result_path("a/b.png").is_none());
        assert!(store.result_path("").is_none());
        assert!(store.result_path("missing.png").is_none());
    }

    #[test]
    fn sweep_deletes_expired_and_keeps_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let temp = store.save_temp(b"normalized").unwrap();
        let image_id = store.save_result(b"output").unwrap();

        // Generous TTL: everything is fresh, nothing is removed.
        assert_eq!(store.sweep_temp(Duration::from_secs(3600)), 0);
        assert_eq!(store.sweep_results(Duration::from_secs(3600)), 0);
        assert!(temp.is_file());
        assert!(store.result_path(&image_id).is_some());

        // Zero TTL: any positive age is expired.
        assert_eq!(store.sweep_temp(Duration::ZERO), 1);
        assert_eq!(store.sweep_results(Duration::ZERO), 1);
        assert!(!temp.is_file());
        assert!(store.result_path(&image_id).is_none());
    }

    #[test]
    fn sweep_of_missing_directory_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        fs::remove_dir_all(store.tmp_dir()).unwrap();

        assert_eq!(store.sweep_temp(Duration::ZERO), 0);
    }
}
