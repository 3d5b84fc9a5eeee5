/// Workspace management for run-scoped artifacts
///
/// Every execution gets its own directory under the workspace root, named
/// with a random UUID and created with mode 0700. The directory is removed
/// when the workspace is released or dropped, whichever comes first.
use crate::config::types::{CoderunError, Result};
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const WORKSPACE_PREFIX: &str = "run-";
const ACQUIRE_ATTEMPTS: usize = 3;

/// Directory owned by exactly one execution
#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    source_file: Option<PathBuf>,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the materialized source file, once written
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Write source text into the workspace, byte for byte
    pub fn materialize(&mut self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\0')
            || filename == "."
            || filename == ".."
        {
            return Err(CoderunError::Workspace(format!(
                "Refusing to materialize invalid file name '{}'",
                filename
            )));
        }

        let source_path = self.dir.join(filename);
        fs::write(&source_path, content).map_err(|e| {
            CoderunError::Workspace(format!(
                "Failed to write source file {}: {}",
                source_path.display(),
                e
            ))
        })?;

        self.source_file = Some(source_path.clone());
        Ok(source_path)
    }

    /// Remove the workspace and everything in it
    pub fn release(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoderunError::Workspace(format!(
                "Failed to remove workspace {}: {}",
                self.dir.display(),
                e
            ))),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!("Workspace drop cleanup failed: {}", e);
        }
    }
}

/// Hands out fresh workspaces under one root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create the manager, creating the root directory if needed
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).map_err(|e| {
            CoderunError::Workspace(format!(
                "Failed to create workspace root {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, empty workspace with an unpredictable name
    pub fn acquire(&self) -> Result<Workspace> {
        let mut builder = fs::DirBuilder::new();
        builder.mode(0o700);

        let mut last_error = None;
        for _ in 0..ACQUIRE_ATTEMPTS {
            let id = Uuid::new_v4().to_string();
            let dir = self.root.join(format!("{WORKSPACE_PREFIX}{id}"));
            match builder.create(&dir) {
                Ok(()) => {
                    log::debug!("Acquired workspace {}", dir.display());
                    return Ok(Workspace {
                        id,
                        dir,
                        source_file: None,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_error = Some(e),
                Err(e) => {
                    return Err(CoderunError::Workspace(format!(
                        "Failed to create workspace directory {}: {}",
                        dir.display(),
                        e
                    )))
                }
            }
        }

        Err(CoderunError::Workspace(format!(
            "Could not allocate a unique workspace under {}: {:?}",
            self.root.display(),
            last_error
        )))
    }

    /// Remove workspaces older than `max_age` left behind by a crashed host process
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut cleaned = 0;

        let entries = fs::read_dir(&self.root).map_err(|e| {
            CoderunError::Workspace(format!(
                "Failed to read workspace root {}: {}",
                self.root.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get modified time for {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = match now.duration_since(modified) {
                Ok(d) => d,
                Err(_) => continue, // Future timestamp, skip
            };

            if age > max_age {
                log::info!("Removing stale workspace {}", path.display());
                match fs::remove_dir_all(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => log::warn!("Failed to remove stale workspace {}: {}", path.display(), e),
                }
            }
        }

        Ok(cleaned)
    }
}
