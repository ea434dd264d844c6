//! Hot tier attach and detach.
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::inventory::Inventory;
use crate::planner::form_bricks_list;
use crate::rebalance::{parse_rebalance_status_xml, RebalanceStatus};
use crate::volume::{get_volume_status, Geometry};
use crate::wait::Poll;
use crate::{run_command, stdout_of, succeeded, GlusterError};

/// `gluster volume tier <vol> attach [replica N] <bricks> [force]`
pub fn tier_attach(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    replica_count: Option<usize>,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("tier".to_string());
    arg_list.push(volname.to_string());
    arg_list.push("attach".to_string());
    if let Some(r) = replica_count {
        if r > 1 {
            arg_list.push("replica".to_string());
            arg_list.push(r.to_string());
        }
    }
    arg_list.extend(bricks.iter().cloned());
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

/// `gluster volume tier <vol> detach <option>`, option one of start, stop, status, commit
/// or force
pub fn tier_detach(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    option: &str,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("tier".to_string());
    arg_list.push(volname.to_string());
    arg_list.push("detach".to_string());
    arg_list.push(option.to_string());
    if option == "status" {
        arg_list.push("--xml".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, option != "status")
}

pub fn get_detach_tier_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<RebalanceStatus> {
    let xml = stdout_of(
        tier_detach(executor, mnode, volname, "status"),
        mnode,
        "gluster volume tier detach status",
    )?;
    parse_rebalance_status_xml(&xml, mnode)
}

/// Plan bricks for a hot tier of shape `tier` on `servers` and attach it
pub fn add_tier(
    executor: &dyn RemoteExecutor,
    inventory: &Inventory,
    mnode: &str,
    volname: &str,
    tier: &Geometry,
    servers: &[String],
    force: bool,
) -> bool {
    let count = match tier.brick_count() {
        Ok(c) => c,
        Err(e) => {
            error!("Bad hot tier geometry for {}: {}", volname, e);
            return false;
        }
    };
    let bricks = match form_bricks_list(executor, mnode, volname, count, servers, inventory, None) {
        Ok(b) => b,
        Err(e) => {
            error!("Unable to plan hot tier bricks for {}: {}", volname, e);
            return false;
        }
    };
    succeeded(
        tier_attach(executor, mnode, volname, &bricks, tier.replica_count, force),
        mnode,
        &format!("volume tier {} attach", volname),
    )
}

/// Start the detach, wait for migration off the hot tier and commit it
pub fn detach_tier(executor: &dyn RemoteExecutor, mnode: &str, volname: &str, poll: Poll) -> bool {
    if !succeeded(
        tier_detach(executor, mnode, volname, "start"),
        mnode,
        &format!("volume tier {} detach start", volname),
    ) {
        return false;
    }
    let migrated = poll.until(|| match get_detach_tier_status(executor, mnode, volname) {
        Some(status) => status.is_completed(),
        None => false,
    });
    if !migrated {
        error!("Detaching the hot tier of {} did not complete within {:?}", volname, poll.timeout);
        return false;
    }
    succeeded(
        tier_detach(executor, mnode, volname, "commit"),
        mnode,
        &format!("volume tier {} detach commit", volname),
    )
}

/// Every node runs an online tier daemon for `volname`
pub fn is_tier_process_running(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    let status = match get_volume_status(executor, mnode, Some(volname), None) {
        Some(s) => s,
        None => return false,
    };
    let nodes = match status.get(volname) {
        Some(n) => n,
        None => return false,
    };
    let daemons: Vec<_> = nodes
        .values()
        .filter_map(|endpoints| endpoints.get("Tier Daemon"))
        .collect();
    !daemons.is_empty() && daemons.iter().all(|d| d.is_online())
}
