//! Shared identity and user types for omnifs.
//!
//! This crate is the leaf of the workspace: inode identifiers, user roles and
//! user records. It has **no internal omnifs dependencies** and every type
//! here is persisted inside a volume, so all of them serialize with serde and
//! encode compactly with postcard.
//!
//! # Key Types
//!
//! | Type          | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | [`Inode`]     | Opaque identifier for a file or directory entry      |
//! | [`Role`]      | `ADMIN` or `STANDARD`, drives the access check       |
//! | [`UserRecord`]| One slot of the on-disk user table                   |

pub mod ids;
pub mod user;

pub use ids::{FIRST_DIR_INODE, FIRST_FILE_INODE, Inode};
pub use user::{MAX_USERNAME_LEN, Role, UserError, UserRecord, unix_now, validate_username};
