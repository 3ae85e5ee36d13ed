//! omnifs command-line driver.
//!
//! Each invocation opens one volume, runs one command and shuts the volume
//! down again.
//!
//! ## Usage
//!
//! ```bash
//! omnifs --volume vol.img format
//! omnifs --volume vol.img mkdir /docs
//! omnifs --volume vol.img create /docs/x --data "hello"
//! omnifs --volume vol.img create /docs/y --from ./local.bin --user amy
//! omnifs --volume vol.img ls /docs
//! omnifs --volume vol.img --json stat
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use omnifs_kernel::{Command, CommandOutput, FsError, Volume, VolumeConfig, execute};
use omnifs_types::Role;

/// Single-volume block filesystem.
#[derive(Parser, Debug)]
#[command(name = "omnifs", version)]
#[command(about = "Drive an omnifs volume from the command line")]
struct Args {
    /// Backing file of the volume
    #[arg(long, global = true, default_value = "omnifs.img")]
    volume: PathBuf,

    /// RON config file (default: ~/.config/omnifs/config.ron or $OMNIFS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create or truncate the volume file and format it
    Format {
        /// Data region size in bytes (overrides config)
        #[arg(long)]
        total_size: Option<u64>,
        /// Block size in bytes (overrides config)
        #[arg(long)]
        block_size: Option<u64>,
    },
    /// Create a file
    Create {
        path: String,
        #[command(flatten)]
        source: DataSource,
        /// Owner of the new file
        #[arg(long, default_value = "admin")]
        user: String,
    },
    /// Print a file
    Read {
        path: String,
        #[arg(long, default_value = "admin")]
        user: String,
    },
    /// Replace a file's content
    Edit {
        path: String,
        #[command(flatten)]
        source: DataSource,
        #[arg(long, default_value = "admin")]
        user: String,
    },
    /// Delete a file
    Delete {
        path: String,
        #[arg(long, default_value = "admin")]
        user: String,
    },
    /// Create a directory
    Mkdir { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Volume statistics
    Stat,
    /// Add a user
    Useradd {
        username: String,
        #[arg(long)]
        password: String,
        /// Grant admin privileges
        #[arg(long)]
        admin: bool,
    },
    /// Remove a user
    Userdel { username: String },
    /// Show the change log
    Log,
}

/// File content, inline or from a local file.
#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct DataSource {
    /// Inline content
    #[arg(long)]
    data: Option<String>,
    /// Read content from a local file
    #[arg(long)]
    from: Option<PathBuf>,
}

impl DataSource {
    fn bytes(&self) -> Result<Vec<u8>> {
        match (&self.data, &self.from) {
            (Some(data), _) => Ok(data.clone().into_bytes()),
            (None, Some(path)) => {
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => anyhow::bail!("one of --data or --from is required"),
        }
    }
}

/// Translate the subcommand into an engine command.
fn to_command(cmd: Cmd, config: VolumeConfig, volume: PathBuf) -> Result<Command> {
    let command = match cmd {
        Cmd::Format {
            total_size,
            block_size,
        } => Command::Format {
            config: VolumeConfig {
                total_size: total_size.unwrap_or(config.total_size),
                block_size: block_size.unwrap_or(config.block_size),
                ..config
            },
            path: volume,
        },
        Cmd::Create { path, source, user } => Command::Create {
            path,
            data: source.bytes()?,
            owner: user,
        },
        Cmd::Read { path, user } => Command::Read { path, user },
        Cmd::Edit { path, source, user } => Command::Edit {
            path,
            data: source.bytes()?,
            user,
        },
        Cmd::Delete { path, user } => Command::Delete { path, user },
        Cmd::Mkdir { path } => Command::Mkdir { path },
        Cmd::Ls { path } => Command::List { path },
        Cmd::Rmdir { path } => Command::Rmdir { path },
        Cmd::Stat => Command::Stat,
        Cmd::Useradd {
            username,
            password,
            admin,
        } => Command::AddUser {
            username,
            password,
            role: if admin { Role::Admin } else { Role::Standard },
        },
        Cmd::Userdel { username } => Command::RemoveUser { username },
        Cmd::Log => Command::Log,
    };
    Ok(command)
}

fn run(args: Args) -> Result<CommandOutput> {
    let config = VolumeConfig::discover(args.config.as_deref()).context("loading config")?;
    let command = to_command(args.command, config, args.volume.clone())?;

    let mut volume = Volume::new();
    if matches!(command, Command::Format { .. }) {
        let output = execute(&mut volume, command)?;
        volume.shutdown()?;
        return Ok(output);
    }

    execute(&mut volume, Command::Init { path: args.volume })?;
    let result = execute(&mut volume, command);
    volume.shutdown()?;
    Ok(result?)
}

fn print(output: &CommandOutput, json: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(output)?)?;
        return Ok(());
    }
    match output {
        CommandOutput::Content { data } => stdout.write_all(data)?,
        CommandOutput::Listing { entries } if entries.is_empty() => {}
        other => writeln!(stdout, "{other}")?,
    }
    Ok(())
}

/// Exit status for an error: the magnitude of its result code, or 1.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<FsError>() {
        Some(fs) => ExitCode::from(fs.kind().code().unsigned_abs() as u8),
        None => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let json = args.json;
    let result = run(args).and_then(|output| print(&output, json));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let (true, Some(fs)) = (json, err.downcast_ref::<FsError>()) {
                let body = serde_json::json!({
                    "result": "error",
                    "kind": fs.kind().to_string(),
                    "code": fs.kind().code(),
                    "message": fs.to_string(),
                });
                println!("{body}");
            }
            tracing::error!("{err:#}");
            exit_code(&err)
        }
    }
}
