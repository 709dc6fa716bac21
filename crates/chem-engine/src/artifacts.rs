//! Per-run output directory.

use chem_types::ChemResult;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// `experiment_dir_<YYYYmmddHHMMSS>` under an output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    pub fn name_for(timestamp: DateTime<Utc>) -> String {
        format!("experiment_dir_{}", timestamp.format("%Y%m%d%H%M%S"))
    }

    /// Create the directory, wiping any previous run with the same name.
    pub fn create(root: impl AsRef<Path>, timestamp: DateTime<Utc>) -> ChemResult<Self> {
        let path = root.as_ref().join(Self::name_for(timestamp));
        if path.exists() {
            tracing::warn!(path = %path.display(), "removing existing run directory");
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join("log")
    }

    /// Where the optimal molecule's visualization goes, without extension.
    pub fn visualization_stem(&self) -> PathBuf {
        self.path.join("optimal_molecule")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn directory_name_uses_compact_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(RunDirectory::name_for(ts), "experiment_dir_20240309070501");
    }

    #[test]
    fn existing_directory_is_recreated() {
        let root = tempfile::tempdir().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = RunDirectory::create(root.path(), ts).unwrap();
        fs::write(first.log_path(), "stale").unwrap();

        let second = RunDirectory::create(root.path(), ts).unwrap();
        assert_eq!(first, second);
        assert!(second.path().is_dir());
        assert!(!second.log_path().exists());
        assert_eq!(
            second.visualization_stem(),
            second.path().join("optimal_molecule")
        );
    }
}
