//! Exporting volumes over SMB and preparing Samba for it.
use std::collections::BTreeMap;

use crate::executor::{all_succeeded, RemoteExecutor};
use crate::paths::ClusterPaths;
use crate::service::service_action;
use crate::volume::set_volume_options;
use crate::wait::Poll;
use crate::{shell_quote, stdout_of};

/// Volume options the Samba hook scripts need before they publish a share
pub const SMB_VOLUME_OPTIONS: [(&str, &str); 3] = [
    ("user.cifs", "on"),
    ("server.allow-insecure", "on"),
    ("storage.batch-fsync-delay-usec", "0"),
];

/// Credentials and the acl granted on the share root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbUser {
    pub password: String,
    #[serde(default)]
    pub acl: Option<String>,
}

pub type SmbUsers = BTreeMap<String, SmbUser>;

/// Settings written into `[global]` of smb.conf to join an AD domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdConfig {
    pub netbios_name: String,
    pub realm: String,
    pub workgroup: String,
    pub idmap_range: String,
    pub idmap_backend: String,
}

/// Samba share name the hook scripts give a volume
pub fn share_name(volname: &str) -> String {
    format!("gluster-{}", volname)
}

/// Share names listed by `smbclient -L`
pub fn parse_smbclient_shares(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 2 && ["Disk", "IPC", "Printer"].contains(&fields[1]) {
                Some(fields[0].to_string())
            } else {
                None
            }
        })
        .collect()
}

pub fn is_smb_share_listed(executor: &dyn RemoteExecutor, node: &str, volname: &str) -> bool {
    let cmd = "smbclient -L localhost -N";
    match stdout_of(executor.run(node, cmd), node, cmd) {
        Some(out) => {
            let wanted = share_name(volname);
            parse_smbclient_shares(&out).iter().any(|s| *s == wanted)
        }
        None => false,
    }
}

/// Add every user to the system and to the Samba password db on each node
pub fn create_smb_users(executor: &dyn RemoteExecutor, nodes: &[String], users: &SmbUsers) -> bool {
    let mut ok = true;
    for (user, info) in users {
        let cmd = format!(
            "(id {user} || useradd -M {user}) && (echo {pw}; echo {pw}) | smbpasswd -s -a {user}",
            user = shell_quote(user),
            pw = shell_quote(&info.password)
        );
        let results = executor.run_parallel(nodes, &cmd);
        if all_succeeded(&format!("create smb user {}", user), &results) {
            info!("Created smb user {} on {:?}", user, nodes);
        } else {
            ok = false;
        }
    }
    ok
}

pub fn delete_smb_users(executor: &dyn RemoteExecutor, nodes: &[String], users: &SmbUsers) -> bool {
    let mut ok = true;
    for user in users.keys() {
        let cmd = format!(
            "smbpasswd -x {user} && userdel {user}",
            user = shell_quote(user)
        );
        let results = executor.run_parallel(nodes, &cmd);
        ok &= all_succeeded(&format!("delete smb user {}", user), &results);
    }
    ok
}

/// Set the Samba volume options on `volname` and wait for the share to show up on `mnode`
pub fn share_volume_over_smb(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let options: BTreeMap<String, String> = SMB_VOLUME_OPTIONS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if !set_volume_options(executor, mnode, volname, &options) {
        error!("Unable to set the smb options on {}", volname);
        return false;
    }
    if !poll.until(|| is_smb_share_listed(executor, mnode, volname)) {
        error!("{} is not listed as a share on {}", share_name(volname), mnode);
        return false;
    }
    info!("Volume {} is shared over smb as {}", volname, share_name(volname));
    true
}

/// Grant each user's acl on the root of a mounted share
pub fn set_smb_acls(
    executor: &dyn RemoteExecutor,
    client: &str,
    mountpoint: &str,
    users: &SmbUsers,
) -> bool {
    let mut ok = true;
    for (user, info) in users {
        if let Some(ref acl) = info.acl {
            let cmd = format!(
                "setfacl -m {} {}",
                shell_quote(&format!("user:{}:{}", user, acl)),
                shell_quote(mountpoint)
            );
            ok &= stdout_of(executor.run(client, &cmd), client, &cmd).is_some();
        }
    }
    ok
}

fn sed_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if "\\/.*[]^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// sed script setting `key = value` under `[global]`, replacing any earlier setting
fn global_setting(conf: &str, key: &str, value: &str) -> String {
    let pattern = sed_escape(key).replace(' ', "[[:space:]]*");
    format!(
        "sed -i {} {} && sed -i {} {}",
        shell_quote(&format!("/^[[:space:]]*{}[[:space:]]*=/d", pattern)),
        shell_quote(conf),
        shell_quote(&format!("/^\\[global\\]/a \\\t{} = {}", key, value)),
        shell_quote(conf)
    )
}

/// Point Samba on `nodes` at an Active Directory domain
pub fn configure_smb_for_ad(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    ad: &AdConfig,
    paths: &ClusterPaths,
) -> bool {
    let settings = [
        ("netbios name", ad.netbios_name.as_str()),
        ("realm", ad.realm.as_str()),
        ("idmap config * : range", ad.idmap_range.as_str()),
        ("idmap config * : backend", ad.idmap_backend.as_str()),
        ("workgroup", ad.workgroup.as_str()),
        ("security", "ads"),
    ];
    let cmd = settings
        .iter()
        .map(|(k, v)| global_setting(&paths.samba_conf, k, v))
        .collect::<Vec<String>>()
        .join(" && ");
    let results = executor.run_parallel(nodes, &cmd);
    if !all_succeeded("configure smb.conf for ads", &results) {
        return false;
    }
    info!("Configured {} for realm {} on {:?}", paths.samba_conf, ad.realm, nodes);
    true
}

pub fn restart_smb(executor: &dyn RemoteExecutor, nodes: &[String]) -> bool {
    service_action(executor, nodes, "smb", "restart") && service_action(executor, nodes, "nmb", "restart")
}
