//! Node path helpers.
//!
//! Paths are absolute and slash-delimited. The root is `/`. Sequential create
//! requests may end with `/`, in which case the ensemble-assigned counter is
//! the whole node name.

use crate::NodeError;
use crate::Result;

pub const ROOT: &str = "/";

/// Width of the zero-padded counter appended to sequential nodes
pub const SEQUENCE_WIDTH: usize = 10;

pub fn validate(path: &str) -> Result<()> {
    validate_inner(path, false)
}

/// Validates the path of a create request; `sequential` allows a trailing `/`.
pub fn validate_create(
    path: &str,
    sequential: bool,
) -> Result<()> {
    validate_inner(path, sequential)
}

fn validate_inner(
    path: &str,
    allow_trailing_slash: bool,
) -> Result<()> {
    let invalid = |reason: &'static str| -> Result<()> {
        Err(NodeError::InvalidPath {
            path: path.to_string(),
            reason,
        }
        .into())
    };

    if path.is_empty() {
        return invalid("path must not be empty");
    }
    if !path.starts_with('/') {
        return invalid("path must start with /");
    }
    if path == ROOT {
        return Ok(());
    }
    if path.contains('\0') {
        return invalid("path must not contain NUL");
    }

    let body = match path.strip_suffix('/') {
        Some(stripped) if allow_trailing_slash => stripped,
        Some(_) => return invalid("path must not end with /"),
        None => path,
    };
    if body.is_empty() {
        // "/" followed by a sequence counter
        return Ok(());
    }

    for segment in body[1..].split('/') {
        match segment {
            "" => return invalid("empty path segment"),
            "." | ".." => return invalid("relative path segment"),
            _ => {}
        }
    }
    Ok(())
}

/// Parent of `path`, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Last segment of `path`; empty for the root.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

pub fn join(
    parent: &str,
    child: &str,
) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Strict ancestors of `path`, outermost first, excluding the root.
///
/// `/a/b/c` yields `/a`, `/a/b`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(p) = parent(current) {
        if p == ROOT {
            break;
        }
        out.push(p);
        current = p;
    }
    out.reverse();
    out
}

/// Formats the counter the ensemble appends to a sequential node.
pub fn sequential_name(
    requested: &str,
    counter: i32,
) -> String {
    format!("{requested}{counter:0width$}", width = SEQUENCE_WIDTH)
}

/// Counter of a sequential node name, if the name ends with one.
pub fn sequence_of(path: &str) -> Option<u64> {
    let name = name(path);
    if name.len() < SEQUENCE_WIDTH {
        return None;
    }
    let digits = &name[name.len() - SEQUENCE_WIDTH..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
