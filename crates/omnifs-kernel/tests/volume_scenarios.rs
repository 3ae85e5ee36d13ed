//! Whole-volume scenarios on real backing files.
//!
//! # Tiers
//!
//! - **Tier 0:** the reference walk-throughs (10 MiB volume, `/docs/x`)
//! - **Tier 1:** lifecycle errors (missing file, bad signature, double shutdown)
//! - **Tier 2:** restart persistence of namespace, inodes, users and log

use std::path::{Path, PathBuf};

use omnifs_kernel::{ChangeOp, EntryKind, FileOps, FsError, Volume};
use omnifs_types::{Role, UserRecord};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

// ============================================================================
// Shared test setup
// ============================================================================

fn fresh(total_size: u64) -> (TempDir, PathBuf, Volume, UserRecord) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("omnifs.img");
    let volume = Volume::format(total_size, 4096, &path).unwrap();
    let admin = volume.user("admin").unwrap().clone();
    (dir, path, volume, admin)
}

fn reopen(volume: &mut Volume, path: &Path) -> Volume {
    volume.shutdown().unwrap();
    Volume::init(path).unwrap()
}

fn free(volume: &Volume) -> u64 {
    volume.allocator().unwrap().count_free()
}

// ============================================================================
// Tier 0: reference walk-throughs
// ============================================================================

#[test]
fn test_hello_file_lifecycle() {
    let (_dir, _path, mut volume, admin) = fresh(10 * MIB);
    assert_eq!(volume.allocator().unwrap().capacity(), 2560);

    let inode = volume.create_file("/a.txt", b"hello", &admin).unwrap();
    assert!(inode.get() >= 1000);
    assert_eq!(free(&volume), 2559);
    assert_eq!(volume.read_file("/a.txt", &admin).unwrap(), b"hello");

    volume.delete_file("/a.txt", &admin).unwrap();
    assert_eq!(free(&volume), 2560);
    assert!(matches!(
        volume.read_file("/a.txt", &admin),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn test_docs_listing() {
    let (_dir, _path, mut volume, admin) = fresh(10 * MIB);
    volume.create_directory("/docs").unwrap();
    volume.create_file("/docs/x", b"v", &admin).unwrap();

    let entries = volume.list_directory("/docs").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[0].name, "x");
    assert_eq!(entries[0].size, 1);

    let root = volume.list_directory("/").unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].kind, EntryKind::Directory);
    assert_eq!(root[0].owner, "root");
}

#[test]
fn test_root_lists_before_any_directory() {
    let (_dir, _path, volume, _admin) = fresh(MIB);
    assert!(volume.list_directory("/").unwrap().is_empty());
    assert!(volume.list_directory("//").unwrap().is_empty());
}

#[test]
fn test_nested_directories_and_removal() {
    let (_dir, _path, mut volume, admin) = fresh(MIB);
    volume.create_directory("/a").unwrap();
    volume.create_directory("/a/b").unwrap();
    volume.create_file("/a/b/c.txt", b"deep", &admin).unwrap();
    assert_eq!(volume.read_file("//a//b/c.txt", &admin).unwrap(), b"deep");

    assert!(matches!(
        volume.delete_directory("/a"),
        Err(FsError::NotEmpty(_))
    ));
    volume.delete_file("/a/b/c.txt", &admin).unwrap();
    volume.delete_directory("/a/b").unwrap();
    volume.delete_directory("/a").unwrap();
    assert!(volume.list_directory("/").unwrap().is_empty());
    volume.namespace().unwrap().verify().unwrap();
}

#[test]
fn test_inodes_increase_per_kind() {
    let (_dir, _path, mut volume, admin) = fresh(MIB);
    let d1 = volume.create_directory("/d1").unwrap();
    let f1 = volume.create_file("/f1", b"", &admin).unwrap();
    let d2 = volume.create_directory("/d2").unwrap();
    let f2 = volume.create_file("/f2", b"", &admin).unwrap();
    assert_eq!(d1.get(), 5000);
    assert_eq!(d2.get(), 5001);
    assert_eq!(f1.get(), 1000);
    assert_eq!(f2.get(), 1001);

    // Deleted inodes are not handed out again.
    volume.delete_file("/f2", &admin).unwrap();
    assert_eq!(volume.create_file("/f3", b"", &admin).unwrap().get(), 1002);
}

// ============================================================================
// Tier 1: lifecycle errors
// ============================================================================

#[test]
fn test_init_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Volume::init(dir.path().join("absent.img")),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn test_init_bad_signature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.img");
    std::fs::write(&path, vec![0xAB; 4096]).unwrap();
    assert!(matches!(Volume::init(&path), Err(FsError::InvalidFormat(_))));
}

#[test]
fn test_init_truncated_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.img");
    std::fs::write(&path, b"OMNIFS01").unwrap();
    assert!(matches!(Volume::init(&path), Err(FsError::InvalidFormat(_))));
}

#[test]
fn test_init_corrupt_header_field() {
    let (_dir, path, mut volume, _admin) = fresh(MIB);
    volume.shutdown().unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    // Flip one bit of the version field, right after the magic.
    bytes[8] ^= 0x80;
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(Volume::init(&path), Err(FsError::InvalidFormat(_))));
}

#[test]
fn test_double_shutdown() {
    let (_dir, _path, mut volume, admin) = fresh(MIB);
    volume.shutdown().unwrap();
    assert!(matches!(volume.shutdown(), Err(FsError::InvalidState(_))));
    assert!(matches!(
        volume.create_file("/a", b"x", &admin),
        Err(FsError::InvalidState(_))
    ));
    assert!(matches!(
        volume.list_directory("/"),
        Err(FsError::InvalidState(_))
    ));
    assert!(matches!(volume.change_log(), Err(FsError::InvalidState(_))));
}

#[test]
fn test_format_truncates_existing_volume() {
    let (_dir, path, mut volume, admin) = fresh(MIB);
    volume.create_file("/old", b"stale", &admin).unwrap();
    volume.shutdown().unwrap();

    let volume = Volume::format(MIB, 4096, &path).unwrap();
    assert!(volume.list_directory("/").unwrap().is_empty());
    assert_eq!(free(&volume), 256);
}

// ============================================================================
// Tier 2: restart persistence
// ============================================================================

#[test]
fn test_namespace_survives_restart() {
    let (_dir, path, mut volume, admin) = fresh(MIB);
    volume.create_directory("/docs").unwrap();
    volume.create_file("/docs/a", b"alpha", &admin).unwrap();
    volume.create_file("/b", &vec![7u8; 9000], &admin).unwrap();
    let before_free = free(&volume);
    let before_listing = volume.list_directory("/").unwrap();

    let mut volume = reopen(&mut volume, &path);
    assert_eq!(free(&volume), before_free);
    assert_eq!(volume.list_directory("/").unwrap(), before_listing);
    assert_eq!(volume.read_file("/docs/a", &admin).unwrap(), b"alpha");
    assert_eq!(volume.read_file("/b", &admin).unwrap(), vec![7u8; 9000]);

    // Counters continue where they left off.
    assert_eq!(volume.create_file("/c", b"", &admin).unwrap().get(), 1002);
    assert_eq!(volume.create_directory("/e").unwrap().get(), 5001);
}

#[test]
fn test_users_and_permissions_survive_restart() {
    let (_dir, path, mut volume, _admin) = fresh(MIB);
    volume.add_user("amy", "pw", Role::Standard).unwrap();
    volume.add_user("bob", "pw", Role::Standard).unwrap();
    let amy = volume.user("amy").unwrap().clone();
    volume.create_file("/amy.txt", b"private", &amy).unwrap();

    let mut volume = reopen(&mut volume, &path);
    let bob = volume.authenticate("bob", "pw").unwrap();
    assert!(matches!(
        volume.read_file("/amy.txt", &bob),
        Err(FsError::PermissionDenied(_))
    ));
    let amy = volume.authenticate("amy", "pw").unwrap();
    assert_eq!(volume.read_file("/amy.txt", &amy).unwrap(), b"private");
}

#[test]
fn test_change_log_survives_restart() {
    let (_dir, path, mut volume, admin) = fresh(MIB);
    volume.create_directory("/docs").unwrap();
    volume.create_file("/docs/x", b"v", &admin).unwrap();
    volume.edit_file("/docs/x", b"w", &admin).unwrap();
    volume.delete_file("/docs/x", &admin).unwrap();
    volume.delete_directory("/docs").unwrap();

    let mut volume = reopen(&mut volume, &path);
    let ops: Vec<ChangeOp> = volume.change_log().unwrap().iter().map(|r| r.op).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOp::Format,
            ChangeOp::CreateDirectory,
            ChangeOp::CreateFile,
            ChangeOp::EditFile,
            ChangeOp::DeleteFile,
            ChangeOp::DeleteDirectory,
        ]
    );
    let log = volume.change_log().unwrap();
    assert_eq!(log[2].path, "/docs/x");
    assert_eq!(log[2].actor, "admin");
}

#[test]
fn test_stats() {
    let (_dir, _path, mut volume, admin) = fresh(MIB);
    volume.add_user("amy", "pw", Role::Standard).unwrap();
    volume.create_directory("/docs").unwrap();
    volume.create_file("/docs/a", &vec![1u8; 5000], &admin).unwrap();
    let stats = volume.stats().unwrap();
    assert_eq!(stats.total_blocks, 256);
    assert_eq!(stats.free_blocks, 254);
    assert_eq!(stats.block_size, 4096);
    assert_eq!(stats.files, 1);
    assert_eq!(stats.directories, 1);
    assert_eq!(stats.users, 2);
    assert_eq!(stats.volume_id, volume.header().unwrap().volume_id);
}
