// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Path containment with symlink resolution.
//!
//! Every watcher and the plan-content fetch path run untrusted-ish
//! filenames through [`within`]/[`within_any`] before touching disk, so a
//! symlink planted inside an allowed root can't be used to read or write
//! outside it.

use std::path::{Path, PathBuf};

/// Canonicalize `p`. Rejects empty or relative paths. For paths that don't
/// exist yet, canonicalizes the longest existing ancestor and re-appends the
/// missing tail (so `within` can still be checked against a path that is
/// about to be created).
pub fn normalize(p: &Path) -> Option<PathBuf> {
    if p.as_os_str().is_empty() || !p.is_absolute() {
        return None;
    }
    realpath_best_effort(p)
}

fn realpath_best_effort(p: &Path) -> Option<PathBuf> {
    if let Ok(real) = std::fs::canonicalize(p) {
        return Some(real);
    }
    let mut tail = Vec::new();
    let mut cur = p;
    loop {
        let name = cur.file_name()?;
        tail.push(name.to_os_string());
        let parent = cur.parent()?;
        if let Ok(real_parent) = std::fs::canonicalize(parent) {
            let mut result = real_parent;
            for part in tail.into_iter().rev() {
                result.push(part);
            }
            return Some(result);
        }
        if parent.as_os_str().is_empty() {
            return None;
        }
        cur = parent;
    }
}

/// `true` iff `p` canonicalizes to `base` itself or to a path strictly
/// beneath it. Component-wise (not string-prefix) comparison, so
/// `~/.claude-malicious` never passes for base `~/.claude`.
pub fn within(p: &Path, base: &Path) -> bool {
    let (Some(np), Some(nb)) = (normalize(p), normalize(base)) else {
        return false;
    };
    np == nb || np.strip_prefix(&nb).is_ok()
}

/// Disjunction of [`within`] over several candidate roots.
pub fn within_any(p: &Path, bases: &[PathBuf]) -> bool {
    bases.iter().any(|b| within(p, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_empty_and_relative() {
        assert_eq!(normalize(Path::new("")), None);
        assert_eq!(normalize(Path::new("relative/path")), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        let once = normalize(p).unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn accepts_path_within_base() {
        let dir = tempfile::tempdir().unwrap();
        let child = dir.path().join("sub").join("file.txt");
        fs::create_dir_all(child.parent().unwrap()).unwrap();
        fs::write(&child, b"hi").unwrap();
        assert!(within(&child, dir.path()));
    }

    #[test]
    fn rejects_sibling_with_shared_prefix_string() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".claude");
        let sibling = dir.path().join(".claude-malicious");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&sibling).unwrap();
        assert!(!within(&sibling, &base));
    }

    #[test]
    fn accepts_nonexistent_tail_under_existing_base() {
        let dir = tempfile::tempdir().unwrap();
        let future_file = dir.path().join("not-yet-written.md");
        assert!(within(&future_file, dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escaping_the_base() {
        use std::os::unix::fs::symlink;

        let base_parent = tempfile::tempdir().unwrap();
        let base = base_parent.path().join("allowed");
        fs::create_dir_all(&base).unwrap();

        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"top secret").unwrap();

        let link = base.join("escape");
        symlink(outside.path(), &link).unwrap();

        let via_symlink = link.join("secret.txt");
        assert!(!within(&via_symlink, &base));
    }

    #[test]
    fn within_any_is_true_if_any_root_matches() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let file = b.path().join("x.md");
        fs::write(&file, b"hi").unwrap();
        let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert!(within_any(&file, &roots));
    }
}
