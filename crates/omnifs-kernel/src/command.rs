//! Command surface.
//!
//! One [`Command`] per verb a protocol layer can issue. [`execute`] resolves
//! usernames through the user directory and drives the matching engine call
//! against one volume. The engine never parses a wire format itself; hosts
//! build `Command`s however they like and render [`CommandOutput`] as text
//! (its `Display`) or JSON (serde).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use omnifs_types::{Inode, Role};

use crate::config::VolumeConfig;
use crate::vfs::{ChangeRecord, DirectoryEntry, FileOps, FsResult, Volume, VolumeStats};

/// A request against one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Create or truncate a backing file and format it.
    Format { config: VolumeConfig, path: PathBuf },
    /// Open an existing volume.
    Init { path: PathBuf },
    Shutdown,
    Create {
        path: String,
        data: Vec<u8>,
        owner: String,
    },
    Read { path: String, user: String },
    Edit {
        path: String,
        data: Vec<u8>,
        user: String,
    },
    Delete { path: String, user: String },
    Mkdir { path: String },
    List { path: String },
    Rmdir { path: String },
    /// Volume statistics.
    Stat,
    AddUser {
        username: String,
        password: String,
        role: Role,
    },
    RemoveUser { username: String },
    /// Dump the change log.
    Log,
}

impl Command {
    /// `FORMAT(totalSize, blockSize, path)` with the default users.
    pub fn format(total_size: u64, block_size: u64, path: impl Into<PathBuf>) -> Self {
        Command::Format {
            config: VolumeConfig::with_geometry(total_size, block_size),
            path: path.into(),
        }
    }

    /// Verb name, e.g. `ADD_USER`.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Payload of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutput {
    Done,
    Inode { inode: Inode },
    Content { data: Vec<u8> },
    Listing { entries: Vec<DirectoryEntry> },
    Stats { stats: VolumeStats },
    Log { records: Vec<ChangeRecord> },
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Done => write!(f, "OK"),
            CommandOutput::Inode { inode } => write!(f, "inode {inode}"),
            CommandOutput::Content { data } => write!(f, "{}", String::from_utf8_lossy(data)),
            CommandOutput::Listing { entries } => write!(f, "{}", format_listing(entries)),
            CommandOutput::Stats { stats } => {
                writeln!(f, "volume:      {}", stats.volume_id)?;
                writeln!(f, "block size:  {}", stats.block_size)?;
                writeln!(
                    f,
                    "blocks:      {} total, {} free",
                    stats.total_blocks, stats.free_blocks
                )?;
                writeln!(f, "files:       {}", stats.files)?;
                writeln!(f, "directories: {}", stats.directories)?;
                write!(f, "users:       {}", stats.users)
            }
            CommandOutput::Log { records } => {
                let lines: Vec<String> = records
                    .iter()
                    .map(|r| {
                        format!(
                            "{:>6} {} {} {} by {}",
                            r.seq, r.timestamp, r.op, r.path, r.actor
                        )
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}

/// Listing text: `[FILE] name (N bytes)` or `[DIR]  name`, one per line.
pub fn format_listing(entries: &[DirectoryEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.is_dir() {
                format!("[DIR]  {}", e.name)
            } else {
                format!("[FILE] {} ({} bytes)", e.name, e.size)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result code for a command outcome: `0` on success, the error kind's
/// code otherwise.
pub fn result_code<T>(result: &FsResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.kind().code(),
    }
}

/// Run one command.
///
/// `Format` and `Init` replace whatever volume was open, shutting it down
/// first.
#[tracing::instrument(skip(volume, command), fields(command = command.name()))]
pub fn execute(volume: &mut Volume, command: Command) -> FsResult<CommandOutput> {
    match command {
        Command::Format { config, path } => {
            close_open(volume)?;
            *volume = Volume::format_with(&config, path)?;
            Ok(CommandOutput::Done)
        }
        Command::Init { path } => {
            close_open(volume)?;
            *volume = Volume::init(path)?;
            Ok(CommandOutput::Done)
        }
        Command::Shutdown => {
            volume.shutdown()?;
            Ok(CommandOutput::Done)
        }
        Command::Create { path, data, owner } => {
            let owner = volume.user(&owner)?.clone();
            let inode = volume.create_file(&path, &data, &owner)?;
            Ok(CommandOutput::Inode { inode })
        }
        Command::Read { path, user } => {
            let user = volume.user(&user)?.clone();
            let data = volume.read_file(&path, &user)?;
            Ok(CommandOutput::Content { data })
        }
        Command::Edit { path, data, user } => {
            let user = volume.user(&user)?.clone();
            volume.edit_file(&path, &data, &user)?;
            Ok(CommandOutput::Done)
        }
        Command::Delete { path, user } => {
            let user = volume.user(&user)?.clone();
            volume.delete_file(&path, &user)?;
            Ok(CommandOutput::Done)
        }
        Command::Mkdir { path } => {
            let inode = volume.create_directory(&path)?;
            Ok(CommandOutput::Inode { inode })
        }
        Command::List { path } => Ok(CommandOutput::Listing {
            entries: volume.list_directory(&path)?,
        }),
        Command::Rmdir { path } => {
            volume.delete_directory(&path)?;
            Ok(CommandOutput::Done)
        }
        Command::Stat => Ok(CommandOutput::Stats {
            stats: volume.stats()?,
        }),
        Command::AddUser {
            username,
            password,
            role,
        } => {
            volume.add_user(&username, &password, role)?;
            Ok(CommandOutput::Done)
        }
        Command::RemoveUser { username } => {
            volume.remove_user(&username)?;
            Ok(CommandOutput::Done)
        }
        Command::Log => Ok(CommandOutput::Log {
            records: volume.change_log()?,
        }),
    }
}

fn close_open(volume: &mut Volume) -> FsResult<()> {
    if volume.is_initialized() {
        info!("closing open volume before replacing it");
        volume.shutdown()?;
    }
    Ok(())
}
