//! Self-heal: triggering heals, reading heal info and inspecting the self-heal daemon.
use std::collections::BTreeMap;

use crate::brick::Brick;
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::paths::ClusterPaths;
use crate::volfile::{client_bricks, read_volfile};
use crate::{run_command, shell_quote, GlusterError};

/// Pending heal count of one brick as heal info reports it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrickHealInfo {
    pub status: String,
    /// `-` when the brick could not be queried
    pub number_of_entries: String,
}

impl BrickHealInfo {
    pub fn pending(&self) -> Option<u64> {
        self.number_of_entries.trim().parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct XmlHealOutput {
    #[serde(rename = "opRet")]
    op_ret: String,
    #[serde(rename = "healInfo", default)]
    heal_info: Option<XmlHealInfo>,
}

#[derive(Debug, Deserialize)]
struct XmlHealInfo {
    bricks: XmlHealBricks,
}

#[derive(Debug, Deserialize)]
struct XmlHealBricks {
    #[serde(rename = "brick", default)]
    brick: Vec<XmlHealBrick>,
}

#[derive(Debug, Deserialize)]
struct XmlHealBrick {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "numberOfEntries", default)]
    number_of_entries: String,
}

/// Parse `gluster volume heal <vol> info [split-brain] --xml` into brick -> pending entries
pub fn parse_heal_info_xml(xml: &str) -> Option<BTreeMap<String, BrickHealInfo>> {
    let parsed: XmlHealOutput = match serde_xml_rs::from_str(xml) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to parse heal info xml: {}", e);
            return None;
        }
    };
    if parsed.op_ret.trim() != "0" {
        error!("heal info reported opRet {}", parsed.op_ret.trim());
        return None;
    }
    let bricks = parsed.heal_info?.bricks.brick;
    Some(
        bricks
            .into_iter()
            .map(|b| {
                (
                    b.name,
                    BrickHealInfo {
                        status: b.status,
                        number_of_entries: b.number_of_entries,
                    },
                )
            })
            .collect(),
    )
}

fn heal_command(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    extra: &[&str],
    xml: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("heal".to_string());
    arg_list.push(volname.to_string());
    arg_list.extend(extra.iter().map(|e| e.to_string()));
    if xml {
        arg_list.push("--xml".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, !xml)
}

fn checked_bool(result: Result<CommandOutput, GlusterError>, mnode: &str, what: &str) -> bool {
    match result {
        Ok(ref output) if output.success() => {
            info!("{} succeeded on {}", what, mnode);
            true
        }
        Ok(output) => {
            output.log_failure(mnode, what);
            false
        }
        Err(e) => {
            error!("{} could not be run on {}: {}", what, mnode, e);
            false
        }
    }
}

/// Heal the entries the index lists
pub fn trigger_heal(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    checked_bool(
        heal_command(executor, mnode, volname, &[], false),
        mnode,
        &format!("gluster volume heal {}", volname),
    )
}

/// Crawl the whole volume
pub fn trigger_heal_full(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    checked_bool(
        heal_command(executor, mnode, volname, &["full"], false),
        mnode,
        &format!("gluster volume heal {} full", volname),
    )
}

pub fn enable_self_heal_daemon(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    checked_bool(
        heal_command(executor, mnode, volname, &["enable"], false),
        mnode,
        &format!("gluster volume heal {} enable", volname),
    )
}

pub fn disable_self_heal_daemon(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    checked_bool(
        heal_command(executor, mnode, volname, &["disable"], false),
        mnode,
        &format!("gluster volume heal {} disable", volname),
    )
}

fn heal_info(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    extra: &[&str],
) -> Option<BTreeMap<String, BrickHealInfo>> {
    let mut args = vec!["info"];
    args.extend_from_slice(extra);
    match heal_command(executor, mnode, volname, &args, true) {
        Ok(output) => {
            if !output.success() {
                output.log_failure(mnode, &format!("gluster volume heal {} info", volname));
                return None;
            }
            parse_heal_info_xml(&output.stdout)
        }
        Err(e) => {
            error!("heal info could not be run on {}: {}", mnode, e);
            None
        }
    }
}

/// brick -> {status, numberOfEntries}
pub fn get_heal_info_summary(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<BTreeMap<String, BrickHealInfo>> {
    heal_info(executor, mnode, volname, &[])
}

/// Every brick answered and has nothing left to heal
pub fn is_heal_complete(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    let summary = match get_heal_info_summary(executor, mnode, volname) {
        Some(s) => s,
        None => return false,
    };
    if summary.is_empty() {
        error!("Heal info of {} lists no bricks", volname);
        return false;
    }
    let pending: Vec<(&String, &BrickHealInfo)> = summary
        .iter()
        .filter(|(_, info)| info.pending() != Some(0))
        .collect();
    if !pending.is_empty() {
        debug!("Heal of {} pending on {:?}", volname, pending);
        return false;
    }
    true
}

pub fn is_volume_in_split_brain(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    match heal_info(executor, mnode, volname, &["split-brain"]) {
        Some(summary) => {
            let split: Vec<&String> = summary
                .iter()
                .filter(|(_, info)| info.pending().map(|n| n > 0).unwrap_or(false))
                .map(|(brick, _)| brick)
                .collect();
            if split.is_empty() {
                false
            } else {
                error!("{} has entries in split-brain on {:?}", volname, split);
                true
            }
        }
        None => false,
    }
}

/// Number of gfids waiting in a brick's xattrop index
pub fn get_self_heal_count(executor: &dyn RemoteExecutor, brick: &Brick) -> Option<usize> {
    let heal_path = format!("{}/.glusterfs/indices/xattrop", brick.path);
    let cmd = format!("ls -1 {}", shell_quote(&heal_path));
    let output = match executor.run(&brick.host, &cmd) {
        Ok(o) => o,
        Err(e) => {
            error!("Unable to list {} on {}: {}", heal_path, brick.host, e);
            return None;
        }
    };
    if !output.success() {
        output.log_failure(&brick.host, &cmd);
        return None;
    }
    // Count all files that don't start with xattrop.  Those are gfid's that need healing
    Some(
        output
            .stdout
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with("xattrop"))
            .count(),
    )
}

/// glustershd pids per node.  The flag is false when any node has none.
pub fn get_self_heal_daemon_pid(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
) -> (bool, BTreeMap<String, Vec<u32>>) {
    let mut ok = true;
    let mut pids = BTreeMap::new();
    for (node, result) in executor.run_parallel(nodes, "pgrep -f glustershd") {
        let found: Vec<u32> = match result {
            Ok(output) => output
                .stdout
                .split_whitespace()
                .filter_map(|p| p.parse().ok())
                .collect(),
            Err(e) => {
                error!("Unable to look for glustershd on {}: {}", node, e);
                Vec::new()
            }
        };
        if found.is_empty() {
            error!("Self-heal daemon is not running on {}", node);
            ok = false;
        }
        pids.insert(node, found);
    }
    (ok, pids)
}

/// Exactly one self-heal daemon process on every node
pub fn is_shd_daemonized(executor: &dyn RemoteExecutor, nodes: &[String]) -> bool {
    let (ok, pids) = get_self_heal_daemon_pid(executor, nodes);
    if !ok {
        return false;
    }
    for (node, found) in &pids {
        if found.len() != 1 {
            error!("{} runs {} self-heal daemons: {:?}", node, found.len(), found);
            return false;
        }
    }
    info!("Self-heal daemon is daemonized on {:?}", nodes);
    true
}

/// Every brick in `bricks` shows up as a client of the self-heal daemon's graph on `mnode`
pub fn do_bricks_exist_in_shd_volfile(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    paths: &ClusterPaths,
) -> bool {
    let xlators = match read_volfile(executor, mnode, &paths.shd_volfile()) {
        Some(x) => x,
        None => return false,
    };
    let prefix = format!("{}-client-", volname);
    let in_graph: Vec<String> = client_bricks(
        &xlators
            .into_iter()
            .filter(|x| x.name.starts_with(&prefix))
            .collect::<Vec<_>>(),
    );
    let missing: Vec<&String> = bricks.iter().filter(|b| !in_graph.contains(b)).collect();
    if !missing.is_empty() {
        error!(
            "Bricks {:?} of {} are missing from {}",
            missing,
            volname,
            paths.shd_volfile()
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;

    const HEAL_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <healInfo>
    <bricks>
      <brick hostUuid="a1">
        <name>srv1:/bricks/brick0/v1_brick0</name>
        <status>Connected</status>
        <numberOfEntries>0</numberOfEntries>
      </brick>
      <brick hostUuid="a2">
        <name>srv2:/bricks/brick0/v1_brick1</name>
        <status>Connected</status>
        <numberOfEntries>3</numberOfEntries>
      </brick>
      <brick hostUuid="-">
        <name>srv3:/bricks/brick0/v1_brick2</name>
        <status>Transport endpoint is not connected</status>
        <numberOfEntries>-</numberOfEntries>
      </brick>
    </bricks>
  </healInfo>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
</cliOutput>"#;

    #[test]
    fn test_parse_heal_info() {
        let info = parse_heal_info_xml(HEAL_INFO).unwrap();
        assert_eq!(info.len(), 3);
        assert_eq!(info["srv1:/bricks/brick0/v1_brick0"].pending(), Some(0));
        assert_eq!(info["srv2:/bricks/brick0/v1_brick1"].pending(), Some(3));
        assert_eq!(info["srv3:/bricks/brick0/v1_brick2"].pending(), None);
    }

    #[test]
    fn test_is_heal_complete() {
        let mock = MockExecutor::new();
        mock.on("heal v1 info --xml", CommandOutput::ok(HEAL_INFO));
        assert!(!is_heal_complete(&mock, "srv1", "v1"));

        let healed = HEAL_INFO
            .replace("<numberOfEntries>3</numberOfEntries>", "<numberOfEntries>0</numberOfEntries>")
            .replace("<numberOfEntries>-</numberOfEntries>", "<numberOfEntries>0</numberOfEntries>");
        let mock = MockExecutor::new();
        mock.on("heal v1 info --xml", CommandOutput::ok(&healed));
        assert!(is_heal_complete(&mock, "srv1", "v1"));
    }

    #[test]
    fn test_shd_pids() {
        let mock = MockExecutor::new();
        mock.on_node("srv1", "pgrep -f glustershd", CommandOutput::ok("1234\n"));
        mock.on_node("srv2", "pgrep -f glustershd", CommandOutput::ok("2345\n2346\n"));
        let nodes = vec!["srv1".to_string(), "srv2".to_string()];
        let (ok, pids) = get_self_heal_daemon_pid(&mock, &nodes);
        assert!(ok);
        assert_eq!(pids["srv2"], vec![2345, 2346]);
        assert!(!is_shd_daemonized(&mock, &nodes));
        assert!(is_shd_daemonized(&mock, &nodes[..1]));
    }

    #[test]
    fn test_self_heal_count() {
        let mock = MockExecutor::new();
        mock.on(
            "indices/xattrop",
            CommandOutput::ok("xattrop-6f1c3a52\n8d7b6e59-e4a2-4a4c-a1a4-0e0b2f1dc47a\n"),
        );
        let brick = Brick::parse("srv1:/bricks/brick0/v1_brick0").unwrap();
        assert_eq!(get_self_heal_count(&mock, &brick), Some(1));
    }

    #[test]
    fn test_bricks_in_shd_volfile() {
        let mock = MockExecutor::new();
        mock.on(
            "glustershd-server.vol",
            CommandOutput::ok(crate::volfile::tests::CLIENT_VOLFILE),
        );
        let paths = ClusterPaths::default();
        let bricks = vec![
            "srv1:/bricks/brick0/v1_brick0".to_string(),
            "srv4:/bricks/brick0/v1_brick3".to_string(),
        ];
        assert!(do_bricks_exist_in_shd_volfile(&mock, "srv1", "v1", &bricks, &paths));
        let stale = vec!["srv5:/bricks/brick0/v1_brick9".to_string()];
        assert!(!do_bricks_exist_in_shd_volfile(&mock, "srv1", "v1", &stale, &paths));
    }
}
