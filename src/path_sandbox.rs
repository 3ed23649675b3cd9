//! Path sandbox: keep user-supplied paths inside a base directory.
//!
//! Sanitization strips the obvious traversal tricks textually, but the real
//! guarantee is the containment check: the joined path is resolved against the
//! canonical base (symlinks included) and must stay underneath it.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Path '{0}' is not within the allowed directory")]
    PathEscape(String),
}

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Textual cleanup of a user path. Does not touch the filesystem.
pub fn sanitize(path: &str) -> String {
    let mut cleaned: String = path
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c))
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    loop {
        let trimmed = cleaned
            .trim_matches(|c: char| c == '.' || c.is_whitespace())
            .replace("../", "");
        let trimmed = trimmed.strip_prefix("..").unwrap_or(&trimmed).to_string();
        if trimmed == cleaned {
            return cleaned;
        }
        cleaned = trimmed;
    }
}

/// Resolve `user_path` under `base`.
///
/// `base` should already be canonical; it is canonicalized again here so a
/// caller passing a relative or symlinked base still gets a correct check.
pub fn resolve(base: &Path, user_path: &str) -> Result<PathBuf, SandboxError> {
    let escape = || SandboxError::PathEscape(user_path.to_string());

    if has_parent_segment(user_path) {
        return Err(escape());
    }

    let sanitized = sanitize(user_path);
    let relative = Path::new(&sanitized);
    if relative.has_root()
        || relative
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::ParentDir))
    {
        return Err(escape());
    }

    let canonical_base = dunce::canonicalize(base).map_err(|_| escape())?;
    let joined = canonical_base.join(relative);
    let resolved = resolve_existing_prefix(&joined).map_err(|_| escape())?;

    if resolved.starts_with(&canonical_base) {
        Ok(resolved)
    } else {
        Err(escape())
    }
}

fn has_parent_segment(path: &str) -> bool {
    path.replace('\\', "/")
        .split('/')
        .any(|segment| segment.trim() == "..")
}

/// Canonicalize the deepest ancestor that exists and re-append the rest.
///
/// A dangling symlink fails to canonicalize but still exists; writing through
/// it would land wherever it points, so it is an error rather than a missing
/// component.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match dunce::canonicalize(existing) {
            Ok(canonical) => {
                let mut resolved = canonical;
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(_) if is_symlink(existing) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("dangling symlink {}", existing.display()),
                ));
            }
            Err(err) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(err),
            },
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Forward-slash form of `path` relative to `base`.
pub fn relative_to(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
