/// Per-execution workspace directories
///
/// Every execution gets a fresh directory named by a random session id. The
/// directory is the child's working directory, home and temp location, and is
/// removed when the execution finishes.
use crate::config::types::{EngineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Ephemeral directory exclusively owned by one execution
#[derive(Debug)]
pub struct Workspace {
    /// Random session id, also the directory name
    session_id: String,
    /// Absolute path of the directory
    dir: PathBuf,
    /// Files written into the workspace
    artifacts: Vec<PathBuf>,
    destroyed: bool,
}

impl Workspace {
    fn create(base_dir: &Path) -> Result<Self> {
        let session_id = Uuid::new_v4().simple().to_string();
        let dir = base_dir.join(&session_id);

        // create_dir (not create_dir_all) so an existing path is never adopted
        fs::create_dir(&dir).map_err(|e| {
            EngineError::Setup(format!(
                "Failed to create workspace directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        restrict_permissions(&dir);

        Ok(Self {
            session_id,
            dir,
            artifacts: Vec::new(),
            destroyed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Path for `name` inside the workspace. `name` must be a bare file name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        let is_bare = !name.is_empty()
            && candidate.file_name().map(|f| f == candidate.as_os_str()) == Some(true);
        if !is_bare {
            return Err(EngineError::Setup(format!(
                "Refusing workspace file name outside the workspace: {:?}",
                name
            )));
        }
        Ok(self.dir.join(candidate))
    }

    /// Write a file into the workspace and track it as an artifact
    pub fn write_file(&mut self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        fs::write(&path, content).map_err(|e| {
            EngineError::Setup(format!("Failed to write {}: {}", path.display(), e))
        })?;
        self.artifacts.push(path.clone());
        Ok(path)
    }

    /// Reserve the path of a file a compiler will produce
    pub fn artifact_path(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        self.artifacts.push(path.clone());
        Ok(path)
    }

    /// Remove the directory tree. Best-effort and idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("[{}] workspace removed", self.session_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "[{}] failed to remove workspace {}: {}",
                self.session_id,
                self.dir.display(),
                e
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(unix)]
fn restrict_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
        log::warn!("Failed to restrict permissions on {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_dir: &Path) {}

/// Creates workspaces under a single base directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            EngineError::Setup(format!(
                "Failed to create workspace root {}: {}",
                base_dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_workspace(&self) -> Result<Workspace> {
        // The root may have been removed by an external tmp cleaner since startup
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
        }
        Workspace::create(&self.base_dir)
    }

    /// Number of workspace directories currently on disk
    pub fn live_count(&self) -> usize {
        fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Remove workspaces older than `max_age`, left behind by a host crash
    pub fn cleanup_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = SystemTime::now();

        if !self.base_dir.exists() {
            return Ok(0);
        }

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get modified time for {}: {}", path.display(), e);
                    continue;
                }
            };

            // Future timestamps are skipped
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };

            if age >= max_age {
                log::info!("Removing stale workspace {}", path.display());
                match fs::remove_dir_all(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("codebox-test-{}-{}", tag, Uuid::new_v4()))
    }

    #[test]
    fn test_workspace_lifecycle() {
        let root = test_root("lifecycle");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let mut workspace = manager.create_workspace().unwrap();
        assert!(workspace.dir().is_dir());
        assert_eq!(manager.live_count(), 1);

        let source = workspace.write_file("main.py", b"print(1)").unwrap();
        assert!(source.starts_with(workspace.dir()));
        assert_eq!(fs::read_to_string(&source).unwrap(), "print(1)");

        workspace.destroy();
        assert!(!source.exists());
        assert_eq!(manager.live_count(), 0);

        // idempotent
        workspace.destroy();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = test_root("drop");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let dir = {
            let workspace = manager.create_workspace().unwrap();
            workspace.dir().to_path_buf()
        };
        assert!(!dir.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let root = test_root("unique");
        let manager = WorkspaceManager::new(root.clone()).unwrap();

        let a = manager.create_workspace().unwrap();
        let b = manager.create_workspace().unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_ne!(a.dir(), b.dir());

        drop(a);
        drop(b);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_rejects_names_escaping_workspace() {
        let root = test_root("escape");
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        let mut workspace = manager.create_workspace().unwrap();

        for name in ["../evil.java", "/etc/passwd", "a/b.txt", "..", ""] {
            assert!(workspace.write_file(name, b"x").is_err(), "accepted {:?}", name);
        }
        assert!(workspace.artifacts().is_empty());

        drop(workspace);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_cleanup_stale_removes_old_dirs() {
        let root = test_root("stale");
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        fs::create_dir(root.join("leftover")).unwrap();

        let cleaned = manager.cleanup_stale(Duration::from_secs(0)).unwrap();
        assert_eq!(cleaned, 1);
        assert_eq!(manager.live_count(), 0);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_cleanup_stale_keeps_fresh_dirs() {
        let root = test_root("fresh");
        let manager = WorkspaceManager::new(root.clone()).unwrap();
        fs::create_dir(root.join("recent")).unwrap();

        let cleaned = manager.cleanup_stale(Duration::from_secs(3600)).unwrap();
        assert_eq!(cleaned, 0);
        assert_eq!(manager.live_count(), 1);

        let _ = fs::remove_dir_all(&root);
    }
}
