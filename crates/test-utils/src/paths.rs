//! Path utilities for test directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Returns the workspace root directory.
///
/// This is determined by walking up from the test-utils manifest directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// A fresh temporary directory with `history/` and `timeseries/` children.
///
/// # Returns
///
/// The guard (the tree is deleted when it drops), the history directory and
/// the time series directory.
pub fn history_and_output_dirs() -> io::Result<(TempDir, PathBuf, PathBuf)> {
    let root = tempfile::tempdir()?;
    let history = root.path().join("history");
    let output = root.path().join("timeseries");
    fs::create_dir_all(&history)?;
    fs::create_dir_all(&output)?;
    Ok((root, history, output))
}

/// Create an empty file at `path`, along with any missing parents.
pub fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, b"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_exists() {
        let root = workspace_root();
        assert!(root.exists(), "Workspace root should exist: {:?}", root);
        assert!(root.join("Cargo.toml").exists());
    }

    #[test]
    fn test_history_and_output_dirs() {
        let (_guard, history, output) = history_and_output_dirs().unwrap();
        assert!(history.is_dir());
        assert!(output.is_dir());
        touch(&history.join("a/b/c.nc")).unwrap();
        assert!(history.join("a/b/c.nc").is_file());
    }
}
