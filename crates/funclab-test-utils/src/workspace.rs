//! Temporary on-disk workspace for tests that read source or config files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory holding source files and an optional config file.
///
/// The directory is deleted when this value is dropped, even on panic.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub async fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .expect("failed to create fixture directory");
        }
        tokio::fs::write(&path, contents)
            .await
            .expect("failed to write fixture");
        path
    }

    /// Write `funclab.toml` and return its path.
    pub async fn write_config(&self, toml_content: &str) -> PathBuf {
        self.write("funclab.toml", toml_content).await
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
