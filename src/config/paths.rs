// Strongbox — Filesystem Layout
//
//   <data_dir>/<name>.db                     plaintext canonical file
//   <data_dir>/<name>.encrypted.db           encrypted canonical file
//   <data_dir>/<name>.db.backup.<millis>     pre-migration backup
//   <data_dir>/<name>.db.old                 superseded plaintext file
//   <config_dir>/encryption-config.json      feature flags
//   <config_dir>/key-metadata.json           key metadata record

use std::path::{Path, PathBuf};

/// Infix that separates the encrypted file name from the plaintext one.
pub const ENCRYPTED_INFIX: &str = "encrypted";

const CONFIG_FILE: &str = "encryption-config.json";
const METADATA_FILE: &str = "key-metadata.json";

/// Every path belonging to one logical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    data_dir: PathBuf,
    config_dir: PathBuf,
    name: String,
}

impl StorePaths {
    pub fn new(data_dir: impl Into<PathBuf>, config_dir: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            config_dir: config_dir.into(),
            name: name.to_string(),
        }
    }

    /// Default platform directories: `<data>/strongbox` and `<config>/strongbox`.
    pub fn platform_default(name: &str) -> Self {
        let data = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let config = dirs_next::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(data.join("strongbox"), config.join("strongbox"), name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn plaintext_db(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.name))
    }

    pub fn encrypted_db(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}.db", self.name, ENCRYPTED_INFIX))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.config_dir.join(METADATA_FILE)
    }

    /// `<source>.backup.<unix millis>`
    pub fn backup_for(source: &Path, unix_millis: i64) -> PathBuf {
        append_suffix(source, &format!("backup.{}", unix_millis))
    }

    /// `<source>.old`
    pub fn superseded_for(source: &Path) -> PathBuf {
        append_suffix(source, "old")
    }

    pub fn superseded_db(&self) -> PathBuf {
        Self::superseded_for(&self.plaintext_db())
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StorePaths::new("/data", "/config", "app");
        assert_eq!(paths.plaintext_db(), PathBuf::from("/data/app.db"));
        assert_eq!(paths.encrypted_db(), PathBuf::from("/data/app.encrypted.db"));
        assert_eq!(paths.superseded_db(), PathBuf::from("/data/app.db.old"));
        assert_eq!(paths.config_file(), PathBuf::from("/config/encryption-config.json"));
        assert_eq!(paths.metadata_file(), PathBuf::from("/config/key-metadata.json"));
    }

    #[test]
    fn test_backup_name_carries_timestamp() {
        let backup = StorePaths::backup_for(Path::new("/data/app.db"), 1_700_000_000_123);
        assert_eq!(backup, PathBuf::from("/data/app.db.backup.1700000000123"));
    }
}
