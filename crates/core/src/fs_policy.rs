//! Filesystem path policy for sandbox mounts.
//!
//! Mount targets are computed lexically: the host is never consulted, so a
//! symlink on the host cannot influence where a path lands in the container.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an absolute path, resolving `.` and `..` lexically.
///
/// `..` at the root stays at the root, mirroring the kernel's own resolution.
/// Relative and Windows-style paths are rejected.
pub fn normalize_absolute_path(input_path: &str) -> Result<String> {
    // Cross-platform check: reject Windows-style absolute paths on any OS
    if input_path.len() >= 2
        && input_path.as_bytes()[1] == b':'
        && input_path.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::SecurityPolicy(format!(
            "Windows paths are not valid container paths: {}",
            input_path
        )));
    }

    if !input_path.starts_with('/') {
        return Err(Error::SecurityPolicy(format!(
            "Path must be absolute: {}",
            input_path
        )));
    }

    let mut normalized = PathBuf::from("/");
    for component in Path::new(input_path).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::RootDir | Component::CurDir => {}
            Component::Prefix(_) => {
                return Err(Error::SecurityPolicy(format!(
                    "Path prefixes are not allowed: {}",
                    input_path
                )));
            }
        }
    }

    Ok(normalized.to_string_lossy().into_owned())
}

/// Mount target for a host path exposed under the workspace prefix.
///
/// `/data` under `/workspace` becomes `/workspace/data`.
pub fn workspace_target(prefix: &str, host_path: &str) -> Result<String> {
    let prefix = normalize_absolute_path(prefix)?;
    let normalized = normalize_absolute_path(host_path)?;

    let relative = normalized.trim_start_matches('/');
    let target = if relative.is_empty() {
        PathBuf::from(&prefix)
    } else {
        Path::new(&prefix).join(relative)
    };

    // Final safety check: the target must stay under the prefix
    if !target.starts_with(&prefix) {
        return Err(Error::SecurityPolicy(format!(
            "Mount target for {} escapes workspace {}",
            host_path, prefix
        )));
    }

    Ok(target.to_string_lossy().into_owned())
}
