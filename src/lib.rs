//! Drive a Gluster trusted storage pool from a test driver machine.
//!
//! Every operation talks to the cluster through a [`executor::RemoteExecutor`], parses the CLI
//! output it gets back and hands the caller either a typed record, a `bool` or the raw
//! [`executor::CommandOutput`].  Nothing here panics on an unexpected cluster state; the test
//! decides what a failure means.
extern crate crossbeam;
#[macro_use]
extern crate log;
extern crate nom;
extern crate regex;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate serde_xml_rs;
extern crate uuid;

pub mod arequal;
pub mod brick;
pub mod dht;
pub mod executor;
pub mod fault;
pub mod fs;
pub mod harness;
pub mod heal;
pub mod inventory;
pub mod io;
pub mod mock;
pub mod mount;
pub mod nfs_ganesha;
pub mod paths;
pub mod peer;
pub mod planner;
pub mod quota;
pub mod rebalance;
pub mod samba;
pub mod service;
pub mod setup;
pub mod snapshot;
pub mod state;
pub mod telemetry;
pub mod tier;
pub mod uss;
pub mod volfile;
pub mod volume;
pub mod wait;

use std::error::Error;
use std::fmt;

pub use crate::executor::{CommandOutput, RemoteExecutor};
pub use crate::inventory::Inventory;
pub use crate::paths::ClusterPaths;

/// Custom error handling for the library
#[derive(Debug)]
pub enum GlusterError {
    IoError(std::io::Error),
    FromUtf8Error(std::string::FromUtf8Error),
    UuidError(uuid::Error),
    RegexError(regex::Error),
    JsonError(serde_json::Error),
    XmlError(String),
    /// ssh itself could not be run against the node
    TransportError { node: String, reason: String },
    /// A command the caller required to succeed exited non-zero
    CommandError {
        node: String,
        command: String,
        output: CommandOutput,
    },
    ParseError(String),
    /// The planner could not find enough unused bricks
    InsufficientBricks { requested: usize, available: usize },
    PreconditionViolation(String),
    /// Raised by teardown code so a test can abort safely
    ExecutionError(String),
}

impl GlusterError {
    pub fn new(err: String) -> GlusterError {
        GlusterError::ExecutionError(err)
    }
}

impl fmt::Display for GlusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GlusterError::IoError(ref err) => err.fmt(f),
            GlusterError::FromUtf8Error(ref err) => err.fmt(f),
            GlusterError::UuidError(ref err) => err.fmt(f),
            GlusterError::RegexError(ref err) => err.fmt(f),
            GlusterError::JsonError(ref err) => err.fmt(f),
            GlusterError::XmlError(ref err) => write!(f, "xml error: {}", err),
            GlusterError::TransportError { ref node, ref reason } => {
                write!(f, "unable to reach {}: {}", node, reason)
            }
            GlusterError::CommandError {
                ref node,
                ref command,
                ref output,
            } => write!(
                f,
                "'{}' on {} exited with {}: {}",
                command,
                node,
                output.exit,
                output.stderr.trim()
            ),
            GlusterError::ParseError(ref err) => write!(f, "parse error: {}", err),
            GlusterError::InsufficientBricks {
                requested,
                available,
            } => write!(
                f,
                "requested {} bricks but only {} are unused",
                requested, available
            ),
            GlusterError::PreconditionViolation(ref err) => write!(f, "{}", err),
            GlusterError::ExecutionError(ref err) => write!(f, "{}", err),
        }
    }
}

impl Error for GlusterError {}

impl From<std::io::Error> for GlusterError {
    fn from(err: std::io::Error) -> GlusterError {
        GlusterError::IoError(err)
    }
}

impl From<std::string::FromUtf8Error> for GlusterError {
    fn from(err: std::string::FromUtf8Error) -> GlusterError {
        GlusterError::FromUtf8Error(err)
    }
}

impl From<uuid::Error> for GlusterError {
    fn from(err: uuid::Error) -> GlusterError {
        GlusterError::UuidError(err)
    }
}

impl From<regex::Error> for GlusterError {
    fn from(err: regex::Error) -> GlusterError {
        GlusterError::RegexError(err)
    }
}

impl From<serde_json::Error> for GlusterError {
    fn from(err: serde_json::Error) -> GlusterError {
        GlusterError::JsonError(err)
    }
}

impl From<serde_xml_rs::Error> for GlusterError {
    fn from(err: serde_xml_rs::Error) -> GlusterError {
        GlusterError::XmlError(err.to_string())
    }
}

/// Quote a single argument for the remote shell.  Plain words pass through untouched so
/// that logged command lines stay readable.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || "_@%+=:,./-".contains(c)
        });
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Run `command` with `arg_list` on `node`.  When `script_mode` is set the gluster CLI is told
/// not to prompt.
pub(crate) fn run_command(
    executor: &dyn RemoteExecutor,
    node: &str,
    command: &str,
    arg_list: &[String],
    script_mode: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut cmd = String::from(command);
    for arg in arg_list {
        cmd.push(' ');
        cmd.push_str(&shell_quote(arg));
    }
    if script_mode {
        cmd.push_str(" --mode=script");
    }
    debug!("About to run command on {}: {}", node, cmd);
    executor.run(node, &cmd)
}

/// Run `cmd` and log the outcome.  Returns true only when the command exited zero.
pub(crate) fn run_and_check(executor: &dyn RemoteExecutor, node: &str, cmd: &str) -> bool {
    match executor.run(node, cmd) {
        Ok(output) => {
            if output.success() {
                info!("'{}' succeeded on {}", cmd, node);
                true
            } else {
                output.log_failure(node, cmd);
                false
            }
        }
        Err(e) => {
            error!("'{}' could not be run on {}: {}", cmd, node, e);
            false
        }
    }
}

/// Log the outcome of a wrapper call.  True only when it ran and exited zero.
pub(crate) fn succeeded(
    result: Result<CommandOutput, GlusterError>,
    node: &str,
    what: &str,
) -> bool {
    match result {
        Ok(ref output) if output.success() => {
            info!("{} succeeded on {}", what, node);
            true
        }
        Ok(output) => {
            output.log_failure(node, what);
            false
        }
        Err(e) => {
            error!("{} could not be run on {}: {}", what, node, e);
            false
        }
    }
}

/// Stdout of a wrapper call that must succeed, logged and dropped otherwise
pub(crate) fn stdout_of(
    result: Result<CommandOutput, GlusterError>,
    node: &str,
    what: &str,
) -> Option<String> {
    match result {
        Ok(output) => {
            if output.success() {
                Some(output.stdout)
            } else {
                output.log_failure(node, what);
                None
            }
        }
        Err(e) => {
            error!("{} could not be run on {}: {}", what, node, e);
            None
        }
    }
}

/// Translate a human readable size such as `100.0MB` or `0Bytes` into bytes.
pub fn translate_to_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    let units: [(&str, u64); 7] = [
        ("PB", 1024 * 1024 * 1024 * 1024 * 1024),
        ("TB", 1024 * 1024 * 1024 * 1024),
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("Bytes", 1),
        ("B", 1),
    ];
    for (suffix, multiplier) in units.iter() {
        if value.ends_with(suffix) {
            let number = value.trim_end_matches(suffix).trim();
            return match number.parse::<f64>() {
                Ok(n) if n >= 0.0 => Some((n * *multiplier as f64).round() as u64),
                _ => None,
            };
        }
    }
    None
}
