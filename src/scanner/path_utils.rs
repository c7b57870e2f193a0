//! Location, name and extension helpers.
//!
//! A location is the path of a file relative to the scan root, with `/` as
//! the only separator. Components are kept exactly as the filesystem
//! reported them, so joining a location back onto the root reaches the same
//! file for hashing. A path that is not valid UTF-8 has no location.
//!
//! # Example
//!
//! ```
//! use dupreport::scanner::path_utils::{extension_of, file_name_of, relative_location};
//! use std::path::Path;
//!
//! let root = Path::new("/data");
//! let location = relative_location(root, &root.join("photos").join("cat.jpeg")).unwrap();
//! assert_eq!(location, "photos/cat.jpeg");
//! assert_eq!(file_name_of(&location), "cat.jpeg");
//! assert_eq!(extension_of("cat.jpeg"), "jpeg");
//! ```

use std::fs;
use std::path::{Path, PathBuf};

/// Resolve `path` against `root` into a forward-slash location.
///
/// Returns `None` when `path` is not below `root`, is the root itself, or
/// has a component below the root that is not valid UTF-8.
#[must_use]
pub fn relative_location(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    // Joining components rather than replacing `\` keeps a literal backslash
    // in a Unix file name intact.
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;

    Some(parts.join("/"))
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
///
/// A missing file is resolved through its parent directory. Returns `None`
/// if neither can be resolved.
#[must_use]
pub fn resolve_path(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|p| p.join(name))
}

/// The last path segment of a location.
#[must_use]
pub fn file_name_of(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

/// The extension of a file name, without the leading dot.
///
/// Leading dots do not start an extension (`.bashrc` has none), and a name
/// ending in a dot has an empty extension.
#[must_use]
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if name[..idx].bytes().any(|b| b != b'.') => &name[idx + 1..],
        _ => "",
    }
}
