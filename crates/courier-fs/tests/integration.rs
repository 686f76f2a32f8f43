use std::fs;

use courier_fs::{StagedFile, ensure_cache_dir, file_len, place};
use tempfile::tempdir;

#[test]
fn test_staged_file_in_separate_dir_commits_across_dirs() {
    let dir = tempdir().unwrap();
    let staging_dir = dir.path().join("partial");
    let target = dir.path().join("cache").join("file.bin");

    let staged = StagedFile::in_dir(&staging_dir, &target).unwrap();
    fs::write(staged.path(), vec![7u8; 4096]).unwrap();
    assert!(staged.path().starts_with(&staging_dir));

    staged.commit().unwrap();
    assert_eq!(file_len(&target).unwrap(), 4096);
}

#[test]
fn test_existing_target_survives_failed_stage() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("keep.txt");
    fs::write(&target, "original").unwrap();

    {
        let staged = StagedFile::new(&target).unwrap();
        fs::write(staged.path(), "half written").unwrap();
    }

    assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    let leftovers = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn test_cache_dir_then_place() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("downloads");
    ensure_cache_dir(&cache).unwrap();

    let src = dir.path().join("tmp.bin");
    fs::write(&src, b"abc").unwrap();
    place(&src, &cache.join("abc.bin")).unwrap();

    assert_eq!(fs::read(cache.join("abc.bin")).unwrap(), b"abc");
}
