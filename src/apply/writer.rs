// src/apply/writer.rs
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use uuid::Uuid;

/// Replaces `path` with `bytes` atomically.
///
/// Writes a temp file in the same directory, fsyncs it, and renames it over
/// the target. Existing permissions are carried over.
///
/// # Errors
/// Returns error if the directory cannot be created or any write step fails.
/// On error the target is left as it was.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = dir.join(format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let written = write_synced(&tmp, bytes).and_then(|()| {
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp, meta.permissions())?;
        }
        fs::rename(&tmp, path)
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    // Persist the rename itself. Not supported everywhere, so best-effort.
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    #[test]
    fn replaces_content_and_leaves_no_temp_files() -> Result<()> {
        let temp = TempDir::new()?;
        let target = temp.path().join("file.txt");
        fs::write(&target, "old")?;

        write_atomic(&target, b"new")?;

        assert_eq!(fs::read_to_string(&target)?, "new");
        let leftovers = fs::read_dir(temp.path())?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn creates_missing_parent_directories() -> Result<()> {
        let temp = TempDir::new()?;
        let target = temp.path().join("a/b/c.txt");
        write_atomic(&target, b"x")?;
        assert_eq!(fs::read(&target)?, b"x");
        Ok(())
    }
}
