// ABOUTME: SHA-256 checksums for component payloads.
// ABOUTME: Files hash their bytes; directories hash a sorted `path\0digest\n` listing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a directory tree. Only regular files contribute; symlinks and
/// empty directories are ignored.
pub fn sha256_dir(path: &Path) -> io::Result<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_key(path, entry.path())?;
        files.push((rel, sha256_file(entry.path())?));
    }
    files.sort();

    let mut hasher = Sha256::new();
    for (rel, digest) in files {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a file or directory, whichever `path` is.
pub fn digest_path(path: &Path) -> io::Result<String> {
    if path.is_dir() {
        sha256_dir(path)
    } else {
        sha256_file(path)
    }
}

/// Copy a directory tree, returning the number of bytes copied.
///
/// Stops with [`io::ErrorKind::Interrupted`] once `cancelled` is set; nothing
/// is created after that point.
pub(super) fn copy_tree(src: &Path, dst: &Path, cancelled: &AtomicBool) -> io::Result<u64> {
    let interrupted = || io::Error::new(io::ErrorKind::Interrupted, "copy cancelled");
    if cancelled.load(Ordering::SeqCst) {
        return Err(interrupted());
    }
    let mut bytes = 0;
    std::fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        if cancelled.load(Ordering::SeqCst) {
            return Err(interrupted());
        }
        let entry = entry.map_err(io::Error::other)?;
        let target = dst.join(entry.path().strip_prefix(src).map_err(io::Error::other)?);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            bytes += std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(bytes)
}

/// Total size of the regular files under `path` (or of `path` itself).
pub(super) fn size_of(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::other)?.len();
        }
    }
    Ok(total)
}

/// Forward-slash relative path, stable across platforms.
fn relative_key(root: &Path, path: &Path) -> io::Result<String> {
    let rel = path.strip_prefix(root).map_err(io::Error::other)?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_digest_matches_byte_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"hello"));
        assert_eq!(
            sha256_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn dir_digest_tracks_content_and_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a"), b"1").unwrap();
        std::fs::write(dir.path().join("sub/b"), b"2").unwrap();

        let before = sha256_dir(dir.path()).unwrap();
        assert_eq!(before, sha256_dir(dir.path()).unwrap());

        std::fs::write(dir.path().join("sub/b"), b"3").unwrap();
        let changed = sha256_dir(dir.path()).unwrap();
        assert_ne!(before, changed);

        std::fs::rename(dir.path().join("sub/b"), dir.path().join("sub/c")).unwrap();
        assert_ne!(changed, sha256_dir(dir.path()).unwrap());
    }

    #[test]
    fn copied_tree_has_same_digest() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("x/y")).unwrap();
        std::fs::write(src.path().join("x/y/z"), b"payload").unwrap();
        std::fs::write(src.path().join("top"), b"t").unwrap();

        let copy = dst.path().join("copy");
        let bytes = copy_tree(src.path(), &copy, &AtomicBool::new(false)).unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(size_of(&copy).unwrap(), 8);
        assert_eq!(sha256_dir(src.path()).unwrap(), sha256_dir(&copy).unwrap());
    }

    #[test]
    fn cancelled_copy_creates_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("top"), b"t").unwrap();

        let copy = dst.path().join("copy");
        let err = copy_tree(src.path(), &copy, &AtomicBool::new(true)).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(!copy.exists());
    }
}
