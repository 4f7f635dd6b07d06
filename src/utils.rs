//! Utility functions for dirsync
//!
//! Hashing, timestamp capture and path helpers shared by the pattern
//! matcher, the index, and the change detector.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{hash_file_content, file_timestamp};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_file_content(Path::new("example.txt"))?;
//! let modified = file_timestamp(Path::new("example.txt"))?;
//! println!("{} {} example.txt", hash, modified);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SyncError};
use crate::types::{ContentHash, Timestamp};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Hash a file's content with MD5
///
/// The file is read in binary mode in 8KB chunks, so line endings and
/// encodings do not affect the digest.
///
/// # Errors
///
/// - [`SyncError::Io`] if the file cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash::from_digest(&hasher.finalize()))
}

/// Hash in-memory data with MD5
pub fn hash_data(data: &[u8]) -> ContentHash {
    ContentHash::from_digest(&Md5::digest(data))
}

/// Modification time of a file as a [`Timestamp`]
///
/// Follows symbolic links, so a link reports its target's time.
pub fn file_timestamp(path: &Path) -> Result<Timestamp> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(Timestamp::from_system_time(modified))
}

/// Remove a `#` comment and surrounding whitespace from a line
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

/// Convert a relative path into the `/`-separated form used as index key
///
/// # Errors
///
/// - [`SyncError::PathConversion`] if a component is not valid UTF-8
/// - [`SyncError::Internal`] if the path is absolute or contains `..`
pub fn to_index_path(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => return Err(SyncError::PathConversion(relative.as_os_str().to_os_string())),
            },
            Component::CurDir => {}
            _ => {
                return Err(SyncError::internal(format!(
                    "path {:?} is not a plain relative path",
                    relative
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Make a canonical path relative to a canonical root
///
/// Only paths strictly inside `root` qualify; the root itself does not.
///
/// # Errors
///
/// - [`SyncError::OutsideRoot`] if `path` is `root` or lies outside it
pub fn make_relative(path: &Path, root: &Path) -> Result<PathBuf> {
    match path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => Ok(relative.to_path_buf()),
        _ => Err(SyncError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        }),
    }
}

/// Resolve a path the way it will be compared against other paths
///
/// Symbolic links and `..` are resolved; on Windows the verbatim prefix
/// is dropped so results remain usable as glob roots.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    Ok(dunce::canonicalize(path)?)
}

/// Resolve a path that may not exist yet
///
/// The deepest existing ancestor is canonicalised and the remaining
/// components are appended unchanged.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = canonicalize(path) {
        return Ok(canonical);
    }

    let absolute = std::path::absolute(path)?;
    let mut missing = Vec::new();
    let mut current = absolute.as_path();
    while let (Some(parent), Some(name)) = (current.parent(), current.file_name()) {
        missing.push(name);
        if let Ok(mut resolved) = canonicalize(parent) {
            resolved.extend(missing.iter().rev());
            return Ok(resolved);
        }
        current = parent;
    }
    Ok(absolute)
}

/// Whether `candidate` is strictly inside `root` (both canonical)
pub fn is_strictly_inside(candidate: &Path, root: &Path) -> bool {
    candidate != root && candidate.starts_with(root)
}
