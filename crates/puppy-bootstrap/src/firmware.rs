//! Firmware image storage: one file per puppy type.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dock::PuppyType;

/// Resolves and opens firmware images under a configured directory.
#[derive(Debug, Clone)]
pub struct FirmwareStore {
    root: PathBuf,
}

impl FirmwareStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, puppy: PuppyType) -> PathBuf {
        self.root.join(puppy.firmware_file())
    }

    pub fn open(&self, puppy: PuppyType) -> std::io::Result<File> {
        File::open(self.path_for(puppy))
    }

    /// Image size in bytes; 0 when the file is missing.
    pub fn size(&self, puppy: PuppyType) -> u64 {
        let path = self.path_for(puppy);
        match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                info!("Firmware not found: {}", path.display());
                0
            }
        }
    }
}

impl AsRef<Path> for FirmwareStore {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_layout() {
        let store = FirmwareStore::new("/res/puppies");
        assert_eq!(
            store.path_for(PuppyType::ToolHead),
            PathBuf::from("/res/puppies/tool_head.bin")
        );
    }

    #[test]
    fn test_missing_image_has_zero_size() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = FirmwareStore::new(dir.path());
        assert_eq!(store.size(PuppyType::BedController), 0);
        assert!(store.open(PuppyType::BedController).is_err());
    }

    #[test]
    fn test_present_image_size() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = FirmwareStore::new(dir.path());
        std::fs::write(store.path_for(PuppyType::ToolHead), [0xA5u8; 321])
            .expect("write failed");
        assert_eq!(store.size(PuppyType::ToolHead), 321);
    }
}
