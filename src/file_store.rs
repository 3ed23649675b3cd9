//! File store: CRUD over the sandboxed files directory.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path_sandbox::{self, SandboxError};

/// Files larger than this are not returned for display.
pub const MAX_DISPLAY_SIZE: u64 = 1024 * 1024;

/// Number of leading bytes scanned for a NUL when sniffing binary content.
const BINARY_SNIFF_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Cannot display binary file content")]
    BinaryContent,
    #[error("File too large to display (max 1MB)")]
    TooLarge,
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub extension: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    pub language: String,
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    /// Open the store, creating the base directory if needed.
    pub fn open(base: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base = base.as_ref();
        fs::create_dir_all(base)
            .map_err(|e| StoreError::io(format!("create {}", base.display()), e))?;
        let base = dunce::canonicalize(base)
            .map_err(|e| StoreError::io(format!("canonicalize {}", base.display()), e))?;
        Ok(Self { base })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        Ok(path_sandbox::resolve(&self.base, relative)?)
    }

    fn relative(&self, path: &Path) -> String {
        path_sandbox::relative_to(&self.base, path)
    }

    /// Direct children of `relative`, directories first, then by name
    /// ignoring case. A missing target lists as empty.
    pub fn list(&self, relative: &str) -> Result<Vec<FileEntry>, StoreError> {
        let target = self.resolve(relative)?;
        let entries = match fs::read_dir(&target) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(format!("list {relative}"), e)),
        };

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(format!("list {relative}"), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            // Follows symlinks, so a link to a directory lists as a directory.
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let is_directory = metadata.is_dir();
            let is_file = metadata.is_file();

            items.push(FileEntry {
                path: self.relative(&path),
                is_directory,
                size: is_file.then(|| metadata.len()),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                extension: if is_file { extension_of(&name) } else { None },
                language: is_file.then(|| language_for(&name).to_string()),
                name,
            });
        }

        items.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(items)
    }

    /// Sandbox-checked, forward-slash form of `relative`. Touches nothing.
    pub fn normalize(&self, relative: &str) -> Result<String, StoreError> {
        Ok(self.relative(&self.resolve(relative)?))
    }

    pub fn read(&self, relative: &str) -> Result<FileContent, StoreError> {
        let path = self.resolve(relative)?;
        let metadata = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StoreError::NotFound(relative.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(relative.to_string()))
            }
            Err(e) => return Err(StoreError::io(format!("stat {relative}"), e)),
        };

        if is_binary_file(&path).map_err(|e| StoreError::io(format!("read {relative}"), e))? {
            return Err(StoreError::BinaryContent);
        }
        if metadata.len() > MAX_DISPLAY_SIZE {
            return Err(StoreError::TooLarge);
        }

        let bytes = fs::read(&path).map_err(|e| StoreError::io(format!("read {relative}"), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FileContent {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            language: language_for(&name).to_string(),
            path: self.relative(&path),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Write `content` to `relative`, creating parent directories. Returns the
    /// normalized relative path actually written.
    pub fn write(&self, relative: &str, content: &[u8]) -> Result<String, StoreError> {
        let path = self.resolve(relative)?;
        if path == self.base {
            return Err(StoreError::io(
                format!("write {relative:?}"),
                io::Error::new(io::ErrorKind::InvalidInput, "empty file path"),
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(format!("create parent of {relative}"), e))?;
        }
        fs::write(&path, content).map_err(|e| StoreError::io(format!("write {relative}"), e))?;
        Ok(self.relative(&path))
    }

    pub fn make_directory(&self, relative: &str) -> Result<String, StoreError> {
        let path = self.resolve(relative)?;
        fs::create_dir_all(&path)
            .map_err(|e| StoreError::io(format!("create directory {relative}"), e))?;
        Ok(self.relative(&path))
    }

    /// Remove a file or a whole directory tree. `Ok(false)` when nothing was
    /// there. The base directory itself is never removed.
    pub fn delete(&self, relative: &str) -> Result<bool, StoreError> {
        let path = self.resolve(relative)?;
        if path == self.base {
            return Ok(false);
        }
        let metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StoreError::io(format!("stat {relative}"), e)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(format!("delete {relative}"), e)),
        }
    }

    /// Every regular file under the base, skipping dot-named entries.
    pub fn list_all_recursive(&self) -> Result<Vec<String>, StoreError> {
        let mut files = Vec::new();
        let mut pending = vec![self.base.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir)
                .map_err(|e| StoreError::io(format!("walk {}", dir.display()), e))?;
            for entry in entries {
                let entry = entry.map_err(|e| StoreError::io(format!("walk {}", dir.display()), e))?;
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = match entry.file_type() {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(self.relative(&entry.path()));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// True when the first 512 bytes contain a NUL.
pub fn is_binary_file(path: &Path) -> io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(buf[..filled].contains(&0))
}

/// Syntax-highlighting language tag inferred from the file extension.
pub fn language_for(name: &str) -> &'static str {
    let ext = match Path::new(name).extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => return "text",
    };
    match ext.as_str() {
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "json" => "json",
        "xml" => "xml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "txt" => "text",
        "sh" => "bash",
        "bat" => "batch",
        "ps1" => "powershell",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "sql" => "sql",
        "r" => "r",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "dart" => "dart",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "text",
    }
}
