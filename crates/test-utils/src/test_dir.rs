//! Scratch directories for tests that read config or key files.

// Test helpers panic on setup failure.
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory removed on drop.
///
/// ```
/// use modgarden_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let config = dir.write("core.toml", "[credentials]\n");
/// assert!(config.exists());
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Creates the directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: TempDir::new().expect("failed to create temp directory") }
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Path of `relative` inside the directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        self.inner.path().join(relative)
    }

    /// Writes `contents` to `relative`, creating parent directories, and
    /// returns the full path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write<P: AsRef<Path>>(&self, relative: P, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("failed to write test file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
