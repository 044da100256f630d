// tests/integration_backup.rs
use forgefix_core::apply::{backup, BackupStore, FileApplier, NoCheck};
use forgefix_core::error::{ApplyError, ConflictError};
use forgefix_core::patch::{self, diff};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const RUN: &str = "20260101120000-0badc0de";

fn applier(root: &std::path::Path) -> FileApplier {
    FileApplier::new(BackupStore::new(root, RUN), Arc::new(NoCheck))
}

#[test]
fn rollback_restores_bit_identical_content() -> Result<()> {
    let d = tempdir()?;
    let file = d.path().join("src/main.py");
    fs::create_dir_all(d.path().join("src"))?;
    let original = "def main():\r\n    print('hi')  \r\n\tpass";
    fs::write(&file, original)?;

    let new = original.replace("hi", "hello");
    let patch = patch::parse(&diff("src/main.py", original, &new), original)?;
    let applier = applier(d.path());
    let (result, handle) = applier.apply_file(&file, &patch, original)?;

    assert_eq!(fs::read_to_string(&file)?, result.content);
    assert_eq!(result.content, new);

    applier.rollback(&handle)?;
    assert_eq!(fs::read(&file)?, original.as_bytes());
    Ok(())
}

#[test]
fn backups_survive_a_restart() -> Result<()> {
    let d = tempdir()?;
    let a = d.path().join("a.txt");
    let b = d.path().join("b.txt");
    fs::write(&a, "one\ntwo\n")?;
    fs::write(&b, "three\nfour\n")?;

    {
        let applier = applier(d.path());
        for (path, old, new) in [(&a, "one\ntwo\n", "one\n2\n"), (&b, "three\nfour\n", "3\nfour\n")] {
            let patch = patch::parse(&diff("x", old, new), old)?;
            applier.apply_file(path, &patch, old)?;
        }
    }

    let handles = backup::list(d.path(), RUN)?;
    assert_eq!(handles.len(), 2);
    assert_eq!(backup::runs(d.path()), vec![RUN.to_string()]);

    let restored = backup::restore_run(d.path(), RUN)?;
    assert_eq!(restored.len(), 2);
    assert_eq!(fs::read_to_string(&a)?, "one\ntwo\n");
    assert_eq!(fs::read_to_string(&b)?, "three\nfour\n");
    Ok(())
}

#[test]
fn changed_file_is_not_touched() -> Result<()> {
    let d = tempdir()?;
    let file = d.path().join("a.txt");
    fs::write(&file, "edited by someone else\n")?;

    let old = "original\n";
    let patch = patch::parse(&diff("a.txt", old, "patched\n"), old)?;
    let err = applier(d.path()).apply_file(&file, &patch, old).unwrap_err();

    assert!(matches!(err, ApplyError::Conflict(ConflictError::FileChanged)));
    assert_eq!(fs::read_to_string(&file)?, "edited by someone else\n");
    assert!(backup::list(d.path(), RUN).is_err());
    Ok(())
}

#[test]
fn discarded_backup_is_gone() -> Result<()> {
    let d = tempdir()?;
    let file = d.path().join("a.txt");
    fs::write(&file, "x\n")?;
    let patch = patch::parse(&diff("a.txt", "x\n", "y\n"), "x\n")?;

    let applier = applier(d.path());
    let (_, handle) = applier.apply_file(&file, &patch, "x\n")?;
    assert!(handle.backup_path.exists());

    applier.discard(&handle)?;
    assert!(!handle.backup_path.exists());
    assert!(applier.rollback(&handle).is_err());
    assert_eq!(fs::read_to_string(&file)?, "y\n");
    Ok(())
}

#[test]
fn unknown_run_is_an_error() {
    let d = tempdir().unwrap();
    assert!(backup::restore_run(d.path(), "nope").is_err());
}
