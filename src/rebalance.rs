//! Rebalance control and the parser for the migration status the CLI reports for
//! rebalance, remove-brick and tier detach.
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::brick::remove_brick;
use crate::{run_command, GlusterError};

/// Progress of a rebalance (or remove-brick migration) on one node, or summed over all
/// nodes for the aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceNode {
    pub node_name: String,
    pub id: String,
    pub files: String,
    pub size: String,
    pub lookups: String,
    pub failures: String,
    pub skipped: String,
    pub status: String,
    pub status_str: String,
    pub runtime: String,
}

impl RebalanceNode {
    pub fn is_completed(&self) -> bool {
        self.status_str.trim() == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status_str.trim() == "failed"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceStatus {
    pub nodes: Vec<RebalanceNode>,
    pub aggregate: RebalanceNode,
}

impl RebalanceStatus {
    /// Completed on every node and in the aggregate
    pub fn is_completed(&self) -> bool {
        self.aggregate.is_completed() && self.nodes.iter().all(|n| n.is_completed())
    }

    pub fn failed_nodes(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_failed())
            .map(|n| n.node_name.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct XmlRebalanceOutput {
    #[serde(rename = "opRet")]
    op_ret: String,
    #[serde(rename = "volRebalance", default)]
    vol_rebalance: Option<XmlRebalance>,
    #[serde(rename = "volRemoveBrick", default)]
    vol_remove_brick: Option<XmlRebalance>,
    #[serde(rename = "volDetachTier", default)]
    vol_detach_tier: Option<XmlRebalance>,
}

#[derive(Debug, Deserialize)]
struct XmlRebalance {
    #[serde(rename = "node", default)]
    node: Vec<XmlRebalanceNode>,
    #[serde(default)]
    aggregate: Option<XmlRebalanceNode>,
}

#[derive(Debug, Deserialize)]
struct XmlRebalanceNode {
    #[serde(rename = "nodeName", default)]
    node_name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    files: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    lookups: String,
    #[serde(default)]
    failures: String,
    #[serde(default)]
    skipped: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "statusStr", default)]
    status_str: String,
    #[serde(default)]
    runtime: String,
}

impl XmlRebalanceNode {
    fn into_node(self, mnode: &str) -> RebalanceNode {
        RebalanceNode {
            node_name: if self.node_name == "localhost" {
                mnode.to_string()
            } else {
                self.node_name
            },
            id: self.id,
            files: self.files,
            size: self.size,
            lookups: self.lookups,
            failures: self.failures,
            skipped: self.skipped,
            status: self.status,
            status_str: self.status_str,
            runtime: self.runtime,
        }
    }
}

/// Parse the XML of `rebalance status`, `remove-brick status` or `tier detach status`
pub fn parse_rebalance_status_xml(xml: &str, mnode: &str) -> Option<RebalanceStatus> {
    let parsed: XmlRebalanceOutput = match serde_xml_rs::from_str(xml) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to parse rebalance status xml: {}", e);
            return None;
        }
    };
    if parsed.op_ret.trim() != "0" {
        error!("rebalance status reported opRet {}", parsed.op_ret.trim());
        return None;
    }
    let rebalance = parsed
        .vol_rebalance
        .or(parsed.vol_remove_brick)
        .or(parsed.vol_detach_tier)?;
    Some(RebalanceStatus {
        nodes: rebalance
            .node
            .into_iter()
            .map(|n| n.into_node(mnode))
            .collect(),
        aggregate: rebalance
            .aggregate
            .map(|a| a.into_node(mnode))
            .unwrap_or_default(),
    })
}

pub fn rebalance_start(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    fix_layout: bool,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("rebalance".to_string());
    arg_list.push(volname.to_string());
    if fix_layout {
        arg_list.push("fix-layout".to_string());
    }
    arg_list.push("start".to_string());
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn rebalance_stop(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec![
        "volume".to_string(),
        "rebalance".to_string(),
        volname.to_string(),
        "stop".to_string(),
    ];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn rebalance_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec![
        "volume".to_string(),
        "rebalance".to_string(),
        volname.to_string(),
        "status".to_string(),
        "--xml".to_string(),
    ];
    run_command(executor, mnode, "gluster", &arg_list, false)
}

fn parse_output(
    result: Result<CommandOutput, GlusterError>,
    mnode: &str,
    what: &str,
) -> Option<RebalanceStatus> {
    match result {
        Ok(output) => {
            if !output.success() {
                output.log_failure(mnode, what);
                return None;
            }
            parse_rebalance_status_xml(&output.stdout, mnode)
        }
        Err(e) => {
            error!("{} could not be run on {}: {}", what, mnode, e);
            None
        }
    }
}

pub fn get_rebalance_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<RebalanceStatus> {
    parse_output(
        rebalance_status(executor, mnode, volname),
        mnode,
        "gluster volume rebalance status",
    )
}

/// Migration progress of a `remove-brick start`
pub fn get_remove_brick_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Option<RebalanceStatus> {
    parse_output(
        remove_brick(executor, mnode, volname, bricks, "status", None),
        mnode,
        "gluster volume remove-brick status",
    )
}
