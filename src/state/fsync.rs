// ABOUTME: Durable file writes for state files.
// ABOUTME: Write-to-temp-then-rename with file and directory fsync.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a directory so that created, renamed, or deleted entries survive a crash.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Readers observe either the old file or the complete new one, never a
/// partial write.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    let tmp_path = path.with_extension("json.tmp");

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    fsync_dir(parent_dir(path))
}

/// Directory holding `path`; a bare file name lives in the current directory.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents_and_cleans_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let back: Vec<u32> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, vec![4]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn bare_file_name_syncs_current_directory() {
        assert_eq!(parent_dir(Path::new("export.json")), Path::new("."));
        assert_eq!(parent_dir(Path::new("state/export.json")), Path::new("state"));
        fsync_dir(parent_dir(Path::new("export.json"))).unwrap();
    }

    #[test]
    fn fsync_dir_works() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("x")).unwrap();
        fsync_dir(dir.path()).unwrap();
    }
}
