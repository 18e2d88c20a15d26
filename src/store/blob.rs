use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

use super::BlobStore;

/// Keeps raw uploads as plain files below a directory and hands out `file://` URLs.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

/// Drop every key component that could escape the blob directory.
fn sanitize_key(key: &str) -> PathBuf {
    Path::new(key)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

impl BlobStore for FileBlobStore {
    fn store(&self, bytes: &[u8], key: &str) -> Result<String, StoreError> {
        let path = self.root.join(sanitize_key(key));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        let absolute = path.canonicalize()?;
        Ok(format!("file://{}", absolute.display()))
    }
}
