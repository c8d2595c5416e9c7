use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

fn denied(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, msg)
}

/// Resolve a host file identifier against the share `root`: no absolute paths,
/// no `..`, and if `follow_symlinks` the canonicalized path must stay under root;
/// otherwise any symlink along the way is refused.
pub fn resolve_host_id(root: &Path, id: &str, policy: PathPolicy) -> io::Result<PathBuf> {
    let rel = Path::new(id);
    if id.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host file identifier"));
    }
    if rel.is_absolute() || rel.has_root() {
        return Err(denied(format!("absolute identifiers are not allowed: {id:?}")));
    }
    for comp in rel.components() {
        if matches!(comp, Component::ParentDir | Component::Prefix(_)) {
            return Err(denied(format!("parent traversal not allowed: {id:?}")));
        }
    }
    let candidate = root.join(rel);
    if !policy.follow_symlinks {
        let mut cur = root.to_path_buf();
        for comp in rel.components() {
            cur = cur.join(comp);
            if let Ok(m) = std::fs::symlink_metadata(&cur) {
                if m.file_type().is_symlink() {
                    return Err(denied(format!("symlink in path (not following): {cur:?}")));
                }
            }
        }
        Ok(candidate)
    } else {
        let root_can = std::fs::canonicalize(root)?;
        let cand_can = std::fs::canonicalize(&candidate)?;
        if !cand_can.starts_with(&root_can) {
            return Err(denied(format!("path escapes host share: {id:?}")));
        }
        Ok(cand_can)
    }
}
