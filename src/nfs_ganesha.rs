//! NFS-Ganesha: the HA cluster, per-volume exports and edits of their export blocks.
use std::collections::BTreeMap;

use crate::executor::{all_succeeded, CommandOutput, RemoteExecutor};
use crate::paths::ClusterPaths;
use crate::service::service_action;
use crate::volume::set_volume_option;
use crate::wait::{
    wait_for_nfs_ganesha_volume_to_get_exported, wait_for_nfs_ganesha_volume_to_get_unexported,
    Poll,
};
use crate::{run_command, shell_quote, stdout_of, succeeded, GlusterError};

/// A field of the `EXPORT{}` block of `export.<vol>.conf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOption {
    /// true for `Root_squash`, false for `No_root_squash`
    RootSquash(bool),
    DisableAcl(bool),
    Path(String),
    Volpath(String),
    Pseudo(String),
}

impl ExportOption {
    fn key_value(&self) -> (&'static str, String) {
        match *self {
            ExportOption::RootSquash(true) => ("Squash", "\"Root_squash\"".to_string()),
            ExportOption::RootSquash(false) => ("Squash", "\"No_root_squash\"".to_string()),
            ExportOption::DisableAcl(v) => ("Disable_ACL", v.to_string()),
            ExportOption::Path(ref p) => ("Path", format!("\"{}\"", p)),
            ExportOption::Volpath(ref p) => ("volpath", format!("\"{}\"", p)),
            ExportOption::Pseudo(ref p) => ("Pseudo", format!("\"{}\"", p)),
        }
    }
}

/// What `ganesha-ha.sh --status` reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GaneshaHaStatus {
    pub online: Vec<String>,
    /// node whose VIP resource it is -> node currently holding it
    pub vips: BTreeMap<String, String>,
    /// `HEALTHY`, `FAILOVER` or `BAD`
    pub ha_status: String,
}

impl GaneshaHaStatus {
    /// Every VIP sits on its own node and the cluster calls itself healthy
    pub fn is_healthy(&self) -> bool {
        self.ha_status == "HEALTHY" && self.vips.iter().all(|(owner, holder)| owner == holder)
    }
}

pub fn parse_ganesha_ha_status(output: &str) -> Option<GaneshaHaStatus> {
    let mut status = GaneshaHaStatus::default();
    let mut recognised = false;
    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("Online:") {
            recognised = true;
            status.online = line
                .trim_start_matches("Online:")
                .split_whitespace()
                .filter(|w| *w != "[" && *w != "]")
                .map(|w| w.to_string())
                .collect();
        } else if line.contains("Cluster HA Status:") {
            recognised = true;
            if let Some(value) = line.split(':').nth(1) {
                status.ha_status = value.trim().to_string();
            }
        } else {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() == 2 && fields[0].ends_with("-cluster_ip-1") {
                recognised = true;
                let owner = fields[0].trim_end_matches("-cluster_ip-1");
                status.vips.insert(owner.to_string(), fields[1].to_string());
            }
        }
    }
    if !recognised {
        return None;
    }
    Some(status)
}

/// Body of ganesha-ha.conf
pub fn ganesha_ha_conf(ha_name: &str, nodes: &[String], vips: &BTreeMap<String, String>) -> String {
    let mut conf = format!(
        "HA_NAME=\"{}\"\nHA_CLUSTER_NODES=\"{}\"\n",
        ha_name,
        nodes.join(",")
    );
    for node in nodes {
        if let Some(vip) = vips.get(node) {
            conf.push_str(&format!("VIP_{}=\"{}\"\n", node, vip));
        }
    }
    conf
}

/// Write ganesha-ha.conf into shared storage from `mnode`
pub fn create_ganesha_ha_conf(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    ha_name: &str,
    nodes: &[String],
    vips: &BTreeMap<String, String>,
    paths: &ClusterPaths,
) -> bool {
    let missing: Vec<&String> = nodes.iter().filter(|n| !vips.contains_key(*n)).collect();
    if !missing.is_empty() {
        error!("No VIP for {:?}", missing);
        return false;
    }
    let cmd = format!(
        "mkdir -p {} && printf %s {} > {}",
        shell_quote(&paths.ganesha_dir()),
        shell_quote(&ganesha_ha_conf(ha_name, nodes, vips)),
        shell_quote(&paths.ganesha_ha_conf())
    );
    stdout_of(executor.run(mnode, &cmd), mnode, "write ganesha-ha.conf").is_some()
}

/// Start pcsd everywhere, set the hacluster password and authenticate the nodes
pub fn prepare_ganesha_nodes(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    nodes: &[String],
    hacluster_password: &str,
) -> bool {
    if !service_action(executor, nodes, "pcsd", "start") {
        return false;
    }
    let passwd = format!(
        "echo {} | passwd --stdin hacluster",
        shell_quote(hacluster_password)
    );
    let results = executor.run_parallel(nodes, &passwd);
    if !all_succeeded("passwd hacluster", &results) {
        return false;
    }
    let auth = format!(
        "pcs cluster auth {} -u hacluster -p {}",
        nodes.join(" "),
        shell_quote(hacluster_password)
    );
    stdout_of(executor.run(mnode, &auth), mnode, "pcs cluster auth").is_some()
}

pub fn nfs_ganesha_enable(
    executor: &dyn RemoteExecutor,
    mnode: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec!["nfs-ganesha".to_string(), "enable".to_string()];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn nfs_ganesha_disable(
    executor: &dyn RemoteExecutor,
    mnode: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec!["nfs-ganesha".to_string(), "disable".to_string()];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

fn ha_script(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    action: &str,
    extra: Option<&str>,
    paths: &ClusterPaths,
) -> Result<CommandOutput, GlusterError> {
    let mut cmd = format!(
        "{} --{} {}",
        shell_quote(&paths.ganesha_ha_script()),
        action,
        shell_quote(&paths.ganesha_dir())
    );
    if let Some(e) = extra {
        cmd.push(' ');
        cmd.push_str(&shell_quote(e));
    }
    debug!("About to run command on {}: {}", mnode, cmd);
    executor.run(mnode, &cmd)
}

pub fn ganesha_ha_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    paths: &ClusterPaths,
) -> Option<GaneshaHaStatus> {
    let out = stdout_of(
        ha_script(executor, mnode, "status", None, paths),
        mnode,
        "ganesha-ha.sh --status",
    )?;
    parse_ganesha_ha_status(&out)
}

pub fn is_nfs_ganesha_cluster_in_healthy_state(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    paths: &ClusterPaths,
) -> bool {
    match ganesha_ha_status(executor, mnode, paths) {
        Some(status) => {
            if !status.is_healthy() {
                error!("nfs-ganesha cluster is not healthy: {:?}", status);
            }
            status.is_healthy()
        }
        None => false,
    }
}

/// True when the HA cluster reports `BAD`.  A status that cannot be read counts as bad.
pub fn is_nfs_ganesha_cluster_in_bad_state(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    paths: &ClusterPaths,
) -> bool {
    match ganesha_ha_status(executor, mnode, paths) {
        Some(status) => {
            let bad = status.ha_status == "BAD";
            if bad {
                error!("nfs-ganesha cluster is in BAD state");
            }
            bad
        }
        None => {
            error!("Unable to read the nfs-ganesha cluster status from {}", mnode);
            true
        }
    }
}

/// Make ganesha re-read the export block of `volname`
pub fn refresh_config(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    paths: &ClusterPaths,
) -> bool {
    succeeded(
        ha_script(executor, mnode, "refresh-config", Some(volname), paths),
        mnode,
        &format!("ganesha-ha.sh --refresh-config {}", volname),
    )
}

pub fn teardown_nfs_ganesha_cluster(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    paths: &ClusterPaths,
) -> bool {
    succeeded(
        ha_script(executor, mnode, "teardown", None, paths),
        mnode,
        "ganesha-ha.sh --teardown",
    ) && succeeded(
        ha_script(executor, mnode, "cleanup", None, paths),
        mnode,
        "ganesha-ha.sh --cleanup",
    )
}

pub fn export_volume_through_ganesha(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    if !set_volume_option(executor, mnode, volname, "ganesha.enable", "on") {
        return false;
    }
    wait_for_nfs_ganesha_volume_to_get_exported(executor, mnode, volname, poll)
}

pub fn unexport_volume_through_ganesha(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    if !set_volume_option(executor, mnode, volname, "ganesha.enable", "off") {
        return false;
    }
    wait_for_nfs_ganesha_volume_to_get_unexported(executor, mnode, volname, poll)
}

/// sed expression rewriting every `key = ...;` line of an export block
fn export_sed(option: &ExportOption) -> String {
    let (key, value) = option.key_value();
    format!(
        "s#^\\([[:space:]]*\\){}[[:space:]]*=.*#\\1{} = {};#",
        key, key, value
    )
}

/// Edit one field of the export block of `volname` and refresh the export
pub fn set_nfs_ganesha_export_option(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    option: &ExportOption,
    paths: &ClusterPaths,
) -> bool {
    let conf = paths.ganesha_export_conf(volname);
    let cmd = format!("sed -i {} {}", shell_quote(&export_sed(option)), shell_quote(&conf));
    if stdout_of(executor.run(mnode, &cmd), mnode, &cmd).is_none() {
        return false;
    }
    info!("Set {:?} in {}", option, conf);
    refresh_config(executor, mnode, volname, paths)
}

/// Export `subdir` of `volname` instead of its root
pub fn export_subdir(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    subdir: &str,
    paths: &ClusterPaths,
) -> bool {
    let subdir = format!("/{}", subdir.trim_matches('/'));
    let full = format!("/{}{}", volname, subdir);
    [
        ExportOption::Path(full.clone()),
        ExportOption::Pseudo(full),
        ExportOption::Volpath(subdir),
    ]
    .iter()
    .all(|opt| set_nfs_ganesha_export_option(executor, mnode, volname, opt, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;

    const STATUS: &str = "Online: [ srv1 srv2 srv3 ]

srv1-cluster_ip-1 srv1
srv2-cluster_ip-1 srv3
srv3-cluster_ip-1 srv3

Cluster HA Status: FAILOVER
";

    #[test]
    fn test_parse_ha_status() {
        let status = parse_ganesha_ha_status(STATUS).unwrap();
        assert_eq!(status.online, vec!["srv1", "srv2", "srv3"]);
        assert_eq!(status.vips["srv2"], "srv3");
        assert_eq!(status.ha_status, "FAILOVER");
        assert!(!status.is_healthy());
        let healthy = STATUS
            .replace("srv2-cluster_ip-1 srv3", "srv2-cluster_ip-1 srv2")
            .replace("FAILOVER", "HEALTHY");
        assert!(parse_ganesha_ha_status(&healthy).unwrap().is_healthy());
        assert!(parse_ganesha_ha_status("command not found").is_none());
    }

    #[test]
    fn test_bad_state_is_explicit() {
        let mock = MockExecutor::new();
        let paths = ClusterPaths::default();
        mock.on("ganesha-ha.sh --status", CommandOutput::ok(STATUS));
        assert!(!is_nfs_ganesha_cluster_in_bad_state(&mock, "srv1", &paths));

        let bad = MockExecutor::new();
        bad.on("ganesha-ha.sh --status", CommandOutput::ok(&STATUS.replace("FAILOVER", "BAD")));
        assert!(is_nfs_ganesha_cluster_in_bad_state(&bad, "srv1", &paths));

        let broken = MockExecutor::new();
        broken.on("ganesha-ha.sh --status", CommandOutput::fail(1, "no such file"));
        assert!(is_nfs_ganesha_cluster_in_bad_state(&broken, "srv1", &paths));
    }

    #[test]
    fn test_ha_conf() {
        let nodes = vec!["srv1".to_string(), "srv2".to_string()];
        let mut vips = BTreeMap::new();
        vips.insert("srv1".to_string(), "10.70.0.11".to_string());
        vips.insert("srv2".to_string(), "10.70.0.12".to_string());
        assert_eq!(
            ganesha_ha_conf("ganesha-ha-360", &nodes, &vips),
            "HA_NAME=\"ganesha-ha-360\"\nHA_CLUSTER_NODES=\"srv1,srv2\"\nVIP_srv1=\"10.70.0.11\"\nVIP_srv2=\"10.70.0.12\"\n"
        );
        let mock = MockExecutor::new();
        vips.remove("srv2");
        assert!(!create_ganesha_ha_conf(&mock, "srv1", "ha", &nodes, &vips, &ClusterPaths::default()));
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_export_option_edit() {
        let mock = MockExecutor::new();
        let paths = ClusterPaths::default();
        assert!(set_nfs_ganesha_export_option(
            &mock,
            "srv1",
            "v1",
            &ExportOption::RootSquash(true),
            &paths
        ));
        let cmds = mock.commands();
        assert_eq!(
            cmds[0],
            "sed -i 's#^\\([[:space:]]*\\)Squash[[:space:]]*=.*#\\1Squash = \"Root_squash\";#' \
             /var/run/gluster/shared_storage/nfs-ganesha/exports/export.v1.conf"
        );
        assert_eq!(
            cmds[1],
            "/usr/libexec/ganesha/ganesha-ha.sh --refresh-config /var/run/gluster/shared_storage/nfs-ganesha v1"
        );
    }
}
