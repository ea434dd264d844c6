//! Mounting volumes on clients and checking what a server exports.
use std::fmt;

use crate::executor::{all_succeeded, CommandOutput, RemoteExecutor};
use crate::fs::get_mounts;
use crate::samba::{is_smb_share_listed, share_name};
use crate::{shell_quote, GlusterError};

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Glusterfs,
    Nfs,
    Cifs,
    NfsGanesha,
}

impl Protocol {
    pub fn new(name: &str) -> Option<Protocol> {
        match name.trim().to_ascii_lowercase().as_ref() {
            "glusterfs" | "fuse" => Some(Protocol::Glusterfs),
            "nfs" => Some(Protocol::Nfs),
            "cifs" | "smb" => Some(Protocol::Cifs),
            "nfs-ganesha" | "ganesha" => Some(Protocol::NfsGanesha),
            _ => None,
        }
    }

    fn fstype(self) -> &'static str {
        match self {
            Protocol::Glusterfs => "glusterfs",
            Protocol::Nfs | Protocol::NfsGanesha => "nfs",
            Protocol::Cifs => "cifs",
        }
    }

    fn default_options(self) -> Option<&'static str> {
        match self {
            Protocol::Nfs => Some("vers=3"),
            Protocol::NfsGanesha => Some("vers=4.0"),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Protocol::Glusterfs => "glusterfs",
            Protocol::Nfs => "nfs",
            Protocol::Cifs => "cifs",
            Protocol::NfsGanesha => "nfs-ganesha",
        };
        write!(f, "{}", s)
    }
}

/// Export surfaces `is_volume_exported` can check
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShareType {
    Nfs,
    Cifs,
}

/// A volume mounted (or to be mounted) on a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub client: String,
    pub mountpoint: String,
    pub server: String,
    pub volname: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub options: Option<String>,
}

impl Mount {
    pub fn mount(&self, executor: &dyn RemoteExecutor) -> Result<CommandOutput, GlusterError> {
        mount_volume(
            executor,
            &self.volname,
            self.protocol,
            &self.mountpoint,
            &self.server,
            &self.client,
            self.options.as_deref(),
        )
    }

    pub fn umount(&self, executor: &dyn RemoteExecutor) -> Result<CommandOutput, GlusterError> {
        umount_volume(executor, &self.client, &self.mountpoint)
    }

    pub fn is_mounted(&self, executor: &dyn RemoteExecutor) -> bool {
        is_mounted(executor, &self.volname, &self.mountpoint, &self.client)
    }
}

fn device(protocol: Protocol, server: &str, volname: &str) -> String {
    match protocol {
        Protocol::Cifs => format!("//{}/{}", server, share_name(volname)),
        _ => format!("{}:/{}", server, volname),
    }
}

/// `mountpoint` on `client` holds a mount of `volname`
pub fn is_mounted(executor: &dyn RemoteExecutor, volname: &str, mountpoint: &str, client: &str) -> bool {
    let mounts = match get_mounts(executor, client) {
        Some(m) => m,
        None => return false,
    };
    let mountpoint = mountpoint.trim_end_matches('/');
    mounts.iter().any(|m| {
        m.mountpoint == mountpoint
            && (m.device.ends_with(&format!("/{}", volname))
                || m.device.ends_with(&format!("/{}", share_name(volname))))
    })
}

/// Mount `volname` from `server` at `mountpoint` on `client`.  A mountpoint that already holds
/// the volume is left alone.
pub fn mount_volume(
    executor: &dyn RemoteExecutor,
    volname: &str,
    protocol: Protocol,
    mountpoint: &str,
    server: &str,
    client: &str,
    options: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    if is_mounted(executor, volname, mountpoint, client) {
        info!("{} is already mounted at {}:{}", volname, client, mountpoint);
        return Ok(CommandOutput::ok(""));
    }
    let mkdir = format!("mkdir -p {}", shell_quote(mountpoint));
    let output = executor.run(client, &mkdir)?;
    if !output.success() {
        output.log_failure(client, &mkdir);
        return Ok(output);
    }

    let mut cmd = format!("mount -t {}", protocol.fstype());
    let opts: Vec<&str> = protocol
        .default_options()
        .into_iter()
        .chain(options.into_iter())
        .filter(|o| !o.is_empty())
        .collect();
    if !opts.is_empty() {
        cmd.push_str(&format!(" -o {}", shell_quote(&opts.join(","))));
    }
    cmd.push_str(&format!(
        " {} {}",
        shell_quote(&device(protocol, server, volname)),
        shell_quote(mountpoint)
    ));
    let output = executor.run(client, &cmd)?;
    if output.success() {
        info!("Mounted {} over {} at {}:{}", volname, protocol, client, mountpoint);
    } else {
        output.log_failure(client, &cmd);
    }
    Ok(output)
}

pub fn umount_volume(
    executor: &dyn RemoteExecutor,
    client: &str,
    mountpoint: &str,
) -> Result<CommandOutput, GlusterError> {
    let cmd = format!("umount {}", shell_quote(mountpoint));
    let output = executor.run(client, &cmd)?;
    if output.success() {
        info!("Unmounted {}:{}", client, mountpoint);
    } else {
        output.log_failure(client, &cmd);
    }
    Ok(output)
}

/// Parse `showmount -e` output into exported paths
pub fn parse_showmount(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.starts_with('/'))
        .filter_map(|l| l.split_whitespace().next())
        .map(|p| p.to_string())
        .collect()
}

/// `volname` is visible as an NFS export or an SMB share of `mnode`
pub fn is_volume_exported(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    share_type: ShareType,
) -> bool {
    match share_type {
        ShareType::Nfs => {
            let cmd = "showmount -e localhost";
            match executor.run(mnode, cmd) {
                Ok(output) => {
                    if !output.success() {
                        output.log_failure(mnode, cmd);
                        return false;
                    }
                    let wanted = format!("/{}", volname);
                    parse_showmount(&output.stdout).iter().any(|e| *e == wanted)
                }
                Err(e) => {
                    error!("{} could not be run on {}: {}", cmd, mnode, e);
                    false
                }
            }
        }
        ShareType::Cifs => is_smb_share_listed(executor, mnode, volname),
    }
}

/// Append `msg` to every `*.log` under `dirs` and to each of `files` on every node
pub fn inject_msg_in_logs(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    msg: &str,
    dirs: &[&str],
    files: &[&str],
) -> bool {
    let mut parts: Vec<String> = Vec::new();
    for dir in dirs {
        parts.push(format!(
            "find {} -type f -name '*.log' -exec sh -c 'echo \"$0\" >> \"$1\"' {} {{}} \\;",
            shell_quote(dir),
            shell_quote(msg)
        ));
    }
    for file in files {
        parts.push(format!("echo {} >> {}", shell_quote(msg), shell_quote(file)));
    }
    if parts.is_empty() {
        warn!("inject_msg_in_logs called without directories or files");
        return true;
    }
    let cmd = parts.join(" && ");
    let results = executor.run_parallel(nodes, &cmd);
    all_succeeded(&cmd, &results)
}
