//! Brick membership (add, remove, replace, expand, shrink) and brick process control.
use std::collections::BTreeSet;
use std::fmt;

use crate::executor::{CommandOutput, RemoteExecutor};
use crate::inventory::Inventory;
use crate::planner::{form_bricks_list, get_subvols, subvolumes_of};
use crate::service::restart_glusterd;
use crate::volume::{
    as_count, brick_status, get_volume, get_volume_status, split_brick, volume_start,
};
use crate::wait::{wait_for_remove_brick_to_complete, Poll};
use crate::{run_and_check, run_command, shell_quote, GlusterError};

/// A brick as `host:/path`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Brick {
    pub host: String,
    pub path: String,
}

impl Brick {
    pub fn parse(brick: &str) -> Option<Brick> {
        let (host, path) = split_brick(brick)?;
        Some(Brick {
            host: host.to_string(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for Brick {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// How a brick process is taken down
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OfflineMethod {
    /// `kill -9` of the pid volume status reports for the brick
    KillPid,
    /// `pkill` matching the brick path on the brick's node
    ServiceKill,
}

/// How a downed brick is brought back
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OnlineMethod {
    VolumeStartForce,
    GlusterdRestart,
}

fn parse_bricks(bricks: &[String]) -> Option<Vec<Brick>> {
    let mut parsed = Vec::with_capacity(bricks.len());
    for b in bricks {
        match Brick::parse(b) {
            Some(brick) => parsed.push(brick),
            None => {
                error!("{} is not a host:/path brick", b);
                return None;
            }
        }
    }
    Some(parsed)
}

/// `gluster volume add-brick`
pub fn add_brick(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    replica_count: Option<usize>,
    arbiter_count: Option<usize>,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("add-brick".to_string());
    arg_list.push(volname.to_string());
    if let Some(r) = replica_count {
        arg_list.push("replica".to_string());
        arg_list.push(r.to_string());
        if let Some(a) = arbiter_count {
            arg_list.push("arbiter".to_string());
            arg_list.push(a.to_string());
        }
    }
    arg_list.extend(bricks.iter().cloned());
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

/// `gluster volume remove-brick` with `option` one of start, status, stop, commit or force
pub fn remove_brick(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    option: &str,
    replica_count: Option<usize>,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("remove-brick".to_string());
    arg_list.push(volname.to_string());
    if let Some(r) = replica_count {
        arg_list.push("replica".to_string());
        arg_list.push(r.to_string());
    }
    arg_list.extend(bricks.iter().cloned());
    arg_list.push(option.to_string());
    if option == "status" {
        arg_list.push("--xml".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, option != "status")
}

/// `gluster volume replace-brick <vol> <src> <dst> commit force`
pub fn replace_brick(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    src_brick: &str,
    dst_brick: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec![
        "volume".to_string(),
        "replace-brick".to_string(),
        volname.to_string(),
        src_brick.to_string(),
        dst_brick.to_string(),
        "commit".to_string(),
        "force".to_string(),
    ];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

fn log_outcome(result: Result<CommandOutput, GlusterError>, node: &str, what: &str) -> bool {
    match result {
        Ok(ref output) if output.success() => {
            info!("{} succeeded", what);
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

/// Grow `volname`, either by `distribute_count` more subvolumes or by raising every
/// subvolume's replica count by `replica_increase`.  New bricks come from the planner.
pub fn expand_volume(
    executor: &dyn RemoteExecutor,
    inventory: &Inventory,
    mnode: &str,
    volname: &str,
    servers: &[String],
    distribute_count: Option<usize>,
    replica_increase: Option<usize>,
    force: bool,
) -> bool {
    let info = match get_volume(executor, mnode, volname) {
        Some(i) => i,
        None => {
            error!("Unable to expand {}: no volume info", volname);
            return false;
        }
    };
    let subvols = match subvolumes_of(&info) {
        Some(s) => s.all(),
        None => return false,
    };
    let subvol_size = subvols.first().map(|s| s.len()).unwrap_or(1);

    let (count, replica) = match (distribute_count, replica_increase) {
        (_, Some(increase)) if increase > 0 => {
            let current = as_count(&info.replica_count).max(1);
            (subvols.len() * increase, Some(current + increase))
        }
        (Some(dist), _) if dist > 0 => (dist * subvol_size, None),
        _ => (subvol_size, None),
    };
    let bricks = match form_bricks_list(executor, mnode, volname, count, servers, inventory, None) {
        Ok(b) => b,
        Err(e) => {
            error!("Unable to plan {} bricks for {}: {}", count, volname, e);
            return false;
        }
    };
    log_outcome(
        add_brick(executor, mnode, volname, &bricks, replica, None, force),
        mnode,
        &format!("add-brick of {:?} to {}", bricks, volname),
    )
}

/// The brick at `idx` in every subvolume; groups too short to have one are skipped
fn bricks_at_position(subvols: &[Vec<String>], idx: usize) -> Vec<String> {
    subvols
        .iter()
        .filter_map(|group| {
            let brick = group.get(idx).cloned();
            if brick.is_none() {
                warn!("Subvolume {:?} has no brick at position {}", group, idx);
            }
            brick
        })
        .collect()
}

/// Shrink `volname`.
///
/// With `replica_index` one brick at that position is dropped from every subvolume with a
/// forced replica reduction.  Otherwise subvolume `subvol_index` (the last one when `None`)
/// is removed: started, waited on and committed, or forced straight away when `force`.
pub fn shrink_volume(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    subvol_index: Option<usize>,
    replica_index: Option<usize>,
    force: bool,
) -> bool {
    let info = match get_volume(executor, mnode, volname) {
        Some(i) => i,
        None => {
            error!("Unable to shrink {}: no volume info", volname);
            return false;
        }
    };
    let subvols = match subvolumes_of(&info) {
        Some(s) => s.all(),
        None => return false,
    };
    if subvols.is_empty() {
        error!("{} has no subvolumes to remove", volname);
        return false;
    }

    if let Some(idx) = replica_index {
        let replica = as_count(&info.replica_count);
        if replica < 2 || idx >= replica {
            error!(
                "Cannot drop replica position {} from {} with replica count {}",
                idx, volname, replica
            );
            return false;
        }
        let bricks = bricks_at_position(&subvols, idx);
        if bricks.is_empty() {
            error!("No subvolume of {} has a brick at position {}", volname, idx);
            return false;
        }
        return log_outcome(
            remove_brick(executor, mnode, volname, &bricks, "force", Some(replica - 1)),
            mnode,
            &format!("remove-brick replica {} of {:?}", replica - 1, bricks),
        );
    }

    let idx = subvol_index.unwrap_or(subvols.len() - 1);
    let bricks = match subvols.get(idx) {
        Some(b) => b.clone(),
        None => {
            error!("{} has no subvolume {}", volname, idx);
            return false;
        }
    };
    if force {
        return log_outcome(
            remove_brick(executor, mnode, volname, &bricks, "force", None),
            mnode,
            &format!("remove-brick force of {:?}", bricks),
        );
    }
    if !log_outcome(
        remove_brick(executor, mnode, volname, &bricks, "start", None),
        mnode,
        &format!("remove-brick start of {:?}", bricks),
    ) {
        return false;
    }
    if !wait_for_remove_brick_to_complete(
        executor,
        mnode,
        volname,
        &bricks,
        Poll::rebalance(),
    ) {
        error!("Data migration off {:?} did not complete", bricks);
        return false;
    }
    log_outcome(
        remove_brick(executor, mnode, volname, &bricks, "commit", None),
        mnode,
        &format!("remove-brick commit of {:?}", bricks),
    )
}

/// Replace `src_brick` with `dst_brick`, or with a freshly planned brick when `None`.
/// `delete_src` removes the old brick directory afterwards.
pub fn replace_brick_from_volume(
    executor: &dyn RemoteExecutor,
    inventory: &Inventory,
    mnode: &str,
    volname: &str,
    servers: &[String],
    src_brick: &str,
    dst_brick: Option<&str>,
    delete_src: bool,
) -> bool {
    let dst = match dst_brick {
        Some(d) => d.to_string(),
        None => match form_bricks_list(executor, mnode, volname, 1, servers, inventory, None) {
            Ok(mut b) if !b.is_empty() => b.remove(0),
            Ok(_) => return false,
            Err(e) => {
                error!("Unable to plan a replacement for {}: {}", src_brick, e);
                return false;
            }
        },
    };
    if !log_outcome(
        replace_brick(executor, mnode, volname, src_brick, &dst),
        mnode,
        &format!("replace-brick {} -> {}", src_brick, dst),
    ) {
        return false;
    }
    if delete_src {
        return delete_bricks(executor, &[src_brick.to_string()]);
    }
    true
}

/// `rm -rf` each brick directory on its node
pub fn delete_bricks(executor: &dyn RemoteExecutor, bricks: &[String]) -> bool {
    let parsed = match parse_bricks(bricks) {
        Some(p) => p,
        None => return false,
    };
    let mut ok = true;
    for brick in parsed {
        if !run_and_check(
            executor,
            &brick.host,
            &format!("rm -rf {}", shell_quote(&brick.path)),
        ) {
            ok = false;
        }
    }
    ok
}

pub fn get_all_bricks(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> Option<Vec<String>> {
    Some(get_volume(executor, mnode, volname)?.all_bricks())
}

fn split_by_state(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> Option<(Vec<String>, Vec<String>)> {
    let status = get_volume_status(executor, mnode, Some(volname), None)?;
    let mut online = Vec::new();
    let mut offline = Vec::new();
    for brick in bricks {
        match brick_status(&status, volname, brick) {
            Some(s) if s.is_online() => online.push(brick.clone()),
            _ => offline.push(brick.clone()),
        }
    }
    Some((online, offline))
}

pub fn get_online_bricks_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<Vec<String>> {
    let bricks = get_all_bricks(executor, mnode, volname)?;
    Some(split_by_state(executor, mnode, volname, &bricks)?.0)
}

pub fn get_offline_bricks_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<Vec<String>> {
    let bricks = get_all_bricks(executor, mnode, volname)?;
    Some(split_by_state(executor, mnode, volname, &bricks)?.1)
}

/// Every brick in `bricks` has status 1 and a live pid
pub fn are_bricks_online(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> bool {
    match split_by_state(executor, mnode, volname, bricks) {
        Some((_, offline)) => {
            if !offline.is_empty() {
                error!("Bricks of {} not online: {:?}", volname, offline);
                return false;
            }
            info!("Bricks {:?} of {} are online", bricks, volname);
            true
        }
        None => false,
    }
}

pub fn are_bricks_offline(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
) -> bool {
    match split_by_state(executor, mnode, volname, bricks) {
        Some((online, _)) => {
            if !online.is_empty() {
                error!("Bricks of {} still online: {:?}", volname, online);
                return false;
            }
            info!("Bricks {:?} of {} are offline", bricks, volname);
            true
        }
        None => false,
    }
}

/// Take `bricks` down.  With several methods they are used in turn, brick by brick.
pub fn bring_bricks_offline(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    methods: &[OfflineMethod],
) -> bool {
    let methods: &[OfflineMethod] = if methods.is_empty() {
        &[OfflineMethod::KillPid]
    } else {
        methods
    };
    let parsed = match parse_bricks(bricks) {
        Some(p) => p,
        None => return false,
    };
    let status = if methods.contains(&OfflineMethod::KillPid) {
        match get_volume_status(executor, mnode, Some(volname), None) {
            Some(s) => Some(s),
            None => {
                error!("No volume status for {}, cannot find brick pids", volname);
                return false;
            }
        }
    } else {
        None
    };

    let mut ok = true;
    for (i, brick) in parsed.iter().enumerate() {
        let cmd = match methods[i % methods.len()] {
            OfflineMethod::KillPid => {
                let pid = status
                    .as_ref()
                    .and_then(|s| brick_status(s, volname, &brick.to_string()))
                    .map(|s| s.pid.trim().to_string())
                    .filter(|p| p.parse::<i64>().map(|p| p > 0).unwrap_or(false));
                match pid {
                    Some(pid) => format!("kill -9 {}", pid),
                    None => {
                        error!("No running process for brick {}", brick);
                        ok = false;
                        continue;
                    }
                }
            }
            OfflineMethod::ServiceKill => format!(
                "pkill -9 -f {}",
                shell_quote(&format!("glusterfsd.*{}", brick.path))
            ),
        };
        if run_and_check(executor, &brick.host, &cmd) {
            info!("Brought brick {} offline", brick);
        } else {
            ok = false;
        }
    }
    ok
}

/// Bring `bricks` back.  Glusterd restarts happen once per node.
pub fn bring_bricks_online(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    methods: &[OnlineMethod],
) -> bool {
    let methods: &[OnlineMethod] = if methods.is_empty() {
        &[OnlineMethod::VolumeStartForce]
    } else {
        methods
    };
    let parsed = match parse_bricks(bricks) {
        Some(p) => p,
        None => return false,
    };
    let mut restart_nodes: BTreeSet<String> = BTreeSet::new();
    let mut force_start = false;
    for (i, brick) in parsed.iter().enumerate() {
        match methods[i % methods.len()] {
            OnlineMethod::VolumeStartForce => force_start = true,
            OnlineMethod::GlusterdRestart => {
                restart_nodes.insert(brick.host.clone());
            }
        }
    }
    let mut ok = true;
    if !restart_nodes.is_empty() {
        let nodes: Vec<String> = restart_nodes.into_iter().collect();
        ok &= restart_glusterd(executor, &nodes);
    }
    if force_start {
        ok &= log_outcome(
            volume_start(executor, mnode, volname, true),
            mnode,
            &format!("volume start {} force", volname),
        );
    }
    ok
}

/// Index of the subvolume holding `brick`
pub fn subvol_index_of(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    brick: &str,
) -> Option<usize> {
    get_subvols(executor, mnode, volname)?
        .all()
        .iter()
        .position(|s| s.iter().any(|b| b == brick))
}
