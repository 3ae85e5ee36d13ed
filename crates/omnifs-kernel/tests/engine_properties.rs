//! Invariants checked over seeded random operation sequences.
//!
//! Each test formats a small volume (so space actually runs out), drives a
//! few hundred operations from a fixed seed, and checks the invariant after
//! every step.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use omnifs_kernel::{FileOps, FsError, Volume};
use omnifs_types::{Role, UserRecord};
use tempfile::TempDir;

const BLOCK: u64 = 4096;
/// 64 blocks.
const SMALL: u64 = 64 * BLOCK;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("omnifs_kernel=debug")
        .with_test_writer()
        .try_init();
}

fn small_volume() -> (TempDir, Volume, UserRecord) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let volume = Volume::format(SMALL, BLOCK, dir.path().join("vol.img")).unwrap();
    let admin = volume.user("admin").unwrap().clone();
    (dir, volume, admin)
}

fn payload(rng: &mut StdRng, max_blocks: u64) -> Vec<u8> {
    let len = rng.gen_range(0..=(max_blocks * BLOCK) as usize);
    (0..len).map(|_| rng.r#gen()).collect()
}

/// Free blocks plus blocks held by live files equals capacity.
fn assert_conserved(volume: &Volume) {
    let allocator = volume.allocator().unwrap();
    let held: u64 = volume
        .namespace()
        .unwrap()
        .files()
        .map(|f| f.block_count())
        .sum();
    assert_eq!(allocator.count_free() + held, allocator.capacity());
}

#[test]
fn test_allocator_conservation() {
    let (_dir, mut volume, admin) = small_volume();
    let mut rng = StdRng::seed_from_u64(0x0f5);
    let mut model: HashMap<String, Vec<u8>> = HashMap::new();

    for step in 0..400 {
        let name = format!("/f{}", rng.gen_range(0..12));
        let data = payload(&mut rng, 12);
        match rng.gen_range(0..3) {
            0 => match volume.create_file(&name, &data, &admin) {
                Ok(_) => {
                    model.insert(name, data);
                }
                Err(FsError::AlreadyExists(_)) => assert!(model.contains_key(&name)),
                Err(FsError::OutOfSpace(_)) => assert!(!model.contains_key(&name)),
                Err(e) => panic!("step {step}: unexpected {e}"),
            },
            1 => match volume.edit_file(&name, &data, &admin) {
                Ok(()) => {
                    model.insert(name, data);
                }
                Err(FsError::NotFound(_)) => assert!(!model.contains_key(&name)),
                Err(FsError::OutOfSpace(_)) => {}
                Err(e) => panic!("step {step}: unexpected {e}"),
            },
            _ => match volume.delete_file(&name, &admin) {
                Ok(()) => {
                    model.remove(&name);
                }
                Err(FsError::NotFound(_)) => assert!(!model.contains_key(&name)),
                Err(e) => panic!("step {step}: unexpected {e}"),
            },
        }
        assert_conserved(&volume);
    }

    // Round trip: every surviving file reads back exactly.
    for (name, data) in &model {
        assert_eq!(&volume.read_file(name, &admin).unwrap(), data);
    }
}

#[test]
fn test_round_trip_sizes() {
    let (_dir, mut volume, admin) = small_volume();
    let capacity = volume.allocator().unwrap().capacity();
    for len in [0, 1, 4095, 4096, 4097, 3 * 4096 + 17, (capacity * BLOCK) as usize] {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        volume.create_file("/f", &data, &admin).unwrap();
        assert_eq!(volume.read_file("/f", &admin).unwrap(), data);
        volume.delete_file("/f", &admin).unwrap();
    }
    assert!(matches!(
        volume.create_file("/f", &vec![0u8; (capacity * BLOCK) as usize + 1], &admin),
        Err(FsError::OutOfSpace(_))
    ));
    assert_conserved(&volume);
}

#[test]
fn test_permission_enforcement() {
    let (_dir, mut volume, admin) = small_volume();
    volume.add_user("amy", "pw", Role::Standard).unwrap();
    volume.add_user("bob", "pw", Role::Standard).unwrap();
    let amy = volume.user("amy").unwrap().clone();
    let bob = volume.user("bob").unwrap().clone();

    volume.create_file("/secret", b"amy's", &amy).unwrap();
    let free = volume.allocator().unwrap().count_free();
    let listing = volume.list_directory("/").unwrap();

    assert!(matches!(
        volume.read_file("/secret", &bob),
        Err(FsError::PermissionDenied(_))
    ));
    assert!(matches!(
        volume.edit_file("/secret", b"bob's now", &bob),
        Err(FsError::PermissionDenied(_))
    ));
    assert!(matches!(
        volume.delete_file("/secret", &bob),
        Err(FsError::PermissionDenied(_))
    ));

    assert_eq!(volume.allocator().unwrap().count_free(), free);
    assert_eq!(volume.list_directory("/").unwrap(), listing);
    assert_eq!(volume.read_file("/secret", &admin).unwrap(), b"amy's");
}

#[test]
fn test_edit_atomicity_on_out_of_space() {
    let (_dir, mut volume, admin) = small_volume();
    // a: blocks 0..4, filler: 4..60, b: 60..62; 2 blocks free at the end.
    volume.create_file("/a", &vec![b'a'; 4 * BLOCK as usize], &admin).unwrap();
    volume.create_file("/filler", &vec![b'f'; 56 * BLOCK as usize], &admin).unwrap();
    volume.create_file("/b", &vec![b'b'; 2 * BLOCK as usize], &admin).unwrap();
    let free = volume.allocator().unwrap().count_free();
    assert_eq!(free, 2);

    // Freeing a's 4 blocks leaves runs of 4 and 2; 7 blocks fit nowhere.
    let err = volume
        .edit_file("/a", &vec![b'x'; 7 * BLOCK as usize], &admin)
        .unwrap_err();
    assert!(matches!(err, FsError::OutOfSpace(_)));
    assert_eq!(volume.allocator().unwrap().count_free(), free);
    assert_eq!(
        volume.read_file("/a", &admin).unwrap(),
        vec![b'a'; 4 * BLOCK as usize]
    );
    assert_conserved(&volume);

    // Non-contiguous free space is still OutOfSpace for create.
    volume.delete_file("/a", &admin).unwrap();
    assert_eq!(volume.allocator().unwrap().count_free(), 6);
    assert!(matches!(
        volume.create_file("/c", &vec![0u8; 5 * BLOCK as usize], &admin),
        Err(FsError::OutOfSpace(_))
    ));
    volume.create_file("/c", &vec![0u8; 4 * BLOCK as usize], &admin).unwrap();
}

#[test]
fn test_directory_emptiness_gate() {
    let (_dir, mut volume, admin) = small_volume();
    volume.create_directory("/d").unwrap();
    volume.create_directory("/d/sub").unwrap();
    volume.create_directory("/e").unwrap();
    volume.create_file("/e/f", b"x", &admin).unwrap();

    for path in ["/d", "/e"] {
        let before = volume.list_directory(path).unwrap();
        let stats = volume.stats().unwrap();
        assert!(matches!(
            volume.delete_directory(path),
            Err(FsError::NotEmpty(_))
        ));
        assert_eq!(volume.list_directory(path).unwrap(), before);
        assert_eq!(volume.stats().unwrap(), stats);
    }
}

#[test]
fn test_namespace_duality_under_churn() {
    let (_dir, mut volume, admin) = small_volume();
    let mut rng = StdRng::seed_from_u64(0xd1);
    let dirs = ["/a", "/a/b", "/c", "/c/d", "/c/d/e"];

    for _ in 0..300 {
        let dir = dirs[rng.gen_range(0..dirs.len())];
        match rng.gen_range(0..4) {
            0 => {
                let _ = volume.create_directory(dir);
            }
            1 => {
                let _ = volume.delete_directory(dir);
            }
            2 => {
                let _ = volume.create_file(&format!("{dir}/f"), b"x", &admin);
            }
            _ => {
                let _ = volume.delete_file(&format!("{dir}/f"), &admin);
            }
        }
        volume.namespace().unwrap().verify().unwrap();
        assert_conserved(&volume);
    }
}
