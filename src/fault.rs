//! Scripted faults: choosing which bricks may fail, taking them down while a workload runs,
//! remounting a brick read-only and restarting the management daemon.
use std::collections::BTreeMap;

use crate::arequal::compare_subvols_arequal;
use crate::brick::{bring_bricks_offline, bring_bricks_online, Brick, OfflineMethod, OnlineMethod};
use crate::executor::RemoteExecutor;
use crate::fs::{get_mounts, MountEntry};
use crate::heal::is_volume_in_split_brain;
use crate::paths::ClusterPaths;
use crate::planner::{get_subvols, subvolumes_of};
use crate::service::restart_glusterd;
use crate::volume::{as_count, get_volume, get_volume_options, volume_start, TierBricks, VolumeInfo, VolumeType};
use crate::wait::{
    monitor_heal_completion, wait_for_bricks_to_be_offline, wait_for_glusterd_to_start,
    wait_for_peers_to_connect, wait_for_volume_process_to_be_online, Poll,
};
use crate::{run_and_check, shell_quote};

/// Client quorum of a replicated volume, from `cluster.quorum-type`/`cluster.quorum-count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    None,
    Auto,
    /// `None` when the type is fixed but no count was set
    Fixed(Option<usize>),
}

impl Quorum {
    pub fn from_options(options: &BTreeMap<String, String>) -> Quorum {
        let count = options
            .get("cluster.quorum-count")
            .and_then(|c| c.trim().parse::<usize>().ok());
        match options.get("cluster.quorum-type").map(|t| t.trim()) {
            Some("auto") => Quorum::Auto,
            Some("fixed") => Quorum::Fixed(count),
            _ => Quorum::None,
        }
    }

    /// Bricks of a replica set of `replica_count` that may go down with this quorum in force
    pub fn tolerated(self, replica_count: usize) -> usize {
        let max = replica_count.saturating_sub(1);
        match self {
            Quorum::None | Quorum::Fixed(None) => max,
            Quorum::Fixed(Some(c)) => replica_count.saturating_sub(c).min(max),
            Quorum::Auto => replica_count.saturating_sub(replica_count / 2 + 1),
        }
    }
}

/// Bricks chosen to fail, per tier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfflineSelection {
    pub hot: Vec<String>,
    pub cold: Vec<String>,
    pub plain: Vec<String>,
}

impl OfflineSelection {
    pub fn all(&self) -> Vec<String> {
        let mut all = self.hot.clone();
        all.extend(self.cold.iter().cloned());
        all.extend(self.plain.iter().cloned());
        all
    }
}

/// How many bricks of one subvolume can fail without losing it
fn tolerated_failures(vol_type: VolumeType, replica_count: usize, redundancy_count: usize, quorum: Quorum) -> usize {
    if vol_type.is_replicated() {
        quorum.tolerated(replica_count)
    } else if vol_type.is_dispersed() {
        redundancy_count
    } else {
        0
    }
}

/// The first `n` bricks of every subvolume
pub fn pick_from_subvols(subvols: &[Vec<String>], n: usize) -> Vec<String> {
    subvols
        .iter()
        .flat_map(|s| s.iter().take(n).cloned())
        .collect()
}

fn tier_limit(tier: &TierBricks, quorum: Quorum) -> usize {
    tolerated_failures(
        VolumeType::new(&tier.brick_type),
        as_count(&tier.replica_count),
        as_count(&tier.redundancy_count),
        quorum,
    )
}

/// Pick the bricks of `info` that may be taken down together
pub fn select_bricks_for(info: &VolumeInfo, quorum: Quorum) -> Option<OfflineSelection> {
    let subvols = subvolumes_of(info)?;
    let mut selection = OfflineSelection::default();
    if info.is_tiered() {
        if let Some(ref hot) = info.bricks.hot {
            selection.hot = pick_from_subvols(&subvols.hot, tier_limit(hot, quorum));
        }
        if let Some(ref cold) = info.bricks.cold {
            selection.cold = pick_from_subvols(&subvols.cold, tier_limit(cold, quorum));
        }
    } else {
        let n = tolerated_failures(
            info.volume_type(),
            as_count(&info.replica_count),
            as_count(&info.redundancy_count),
            quorum,
        );
        selection.plain = pick_from_subvols(&subvols.plain, n);
    }
    Some(selection)
}

fn volume_quorum(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> Quorum {
    let mut options = BTreeMap::new();
    for key in ["cluster.quorum-type", "cluster.quorum-count"].iter() {
        match get_volume_options(executor, mnode, volname, Some(key)) {
            Some(found) => options.extend(found),
            None => warn!("Unable to read {} of {}, assuming unset", key, volname),
        }
    }
    Quorum::from_options(&options)
}

/// Bricks of `volname` that may be brought down together, grouped by tier
pub fn select_bricks_to_bring_offline(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<OfflineSelection> {
    let info = get_volume(executor, mnode, volname)?;
    let replicated = info.volume_type().is_replicated()
        || info
            .bricks
            .hot
            .iter()
            .chain(info.bricks.cold.iter())
            .any(|t| VolumeType::new(&t.brick_type).is_replicated());
    let quorum = if replicated {
        volume_quorum(executor, mnode, volname)
    } else {
        Quorum::None
    };
    let selection = select_bricks_for(&info, quorum)?;
    debug!("Bricks of {} that may go offline: {:?}", volname, selection);
    Some(selection)
}

pub fn select_volume_bricks_to_bring_offline(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<Vec<String>> {
    select_bricks_to_bring_offline(executor, mnode, volname).map(|s| s.all())
}

/// Timeouts of a fault cycle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CyclePolls {
    pub process: Poll,
    pub heal: Poll,
}

impl Default for CyclePolls {
    fn default() -> Self {
        CyclePolls {
            process: Poll::process_online(),
            heal: Poll::heal(),
        }
    }
}

/// Take `bricks` down, run `workload`, bring them back and check the volume heals into
/// identical subvolumes.
pub fn offline_workload_heal_cycle<F>(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    workload: F,
    polls: CyclePolls,
) -> bool
where
    F: FnOnce() -> bool,
{
    if !bring_bricks_offline(executor, mnode, volname, bricks, &[OfflineMethod::KillPid]) {
        error!("Unable to bring {:?} of {} offline", bricks, volname);
        return false;
    }
    if !wait_for_bricks_to_be_offline(executor, mnode, volname, bricks, polls.process) {
        return false;
    }
    if !workload() {
        error!("Workload failed while {:?} of {} were offline", bricks, volname);
        return false;
    }
    if !bring_bricks_online(executor, mnode, volname, bricks, &[OnlineMethod::VolumeStartForce]) {
        error!("Unable to bring {:?} of {} back online", bricks, volname);
        return false;
    }
    if !wait_for_volume_process_to_be_online(executor, mnode, volname, polls.process) {
        return false;
    }
    if !monitor_heal_completion(executor, mnode, volname, polls.heal) {
        return false;
    }
    if is_volume_in_split_brain(executor, mnode, volname) {
        error!("{} is in split-brain after heal", volname);
        return false;
    }
    match get_subvols(executor, mnode, volname) {
        Some(subvols) => compare_subvols_arequal(executor, &subvols.all()),
        None => false,
    }
}

/// Mount holding `path`: the entry with the longest mountpoint prefixing it
pub fn mount_holding<'a>(entries: &'a [MountEntry], path: &str) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|e| {
            let mp = e.mountpoint.trim_end_matches('/');
            path == e.mountpoint || path.starts_with(&format!("{}/", mp))
        })
        .max_by_key(|e| e.mountpoint.len())
}

/// Remount the filesystem under `brick` read-only and force start the volume.  True when the
/// brick then stays offline and its log records the read-only filesystem.
pub fn remount_brick_read_only(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    brick: &str,
    paths: &ClusterPaths,
    poll: Poll,
) -> bool {
    let parsed = match Brick::parse(brick) {
        Some(b) => b,
        None => {
            error!("{} is not a host:/path brick", brick);
            return false;
        }
    };
    let entries = match get_mounts(executor, &parsed.host) {
        Some(e) => e,
        None => return false,
    };
    let entry = match mount_holding(&entries, &parsed.path) {
        Some(e) => e.clone(),
        None => {
            error!("No mount on {} holds {}", parsed.host, parsed.path);
            return false;
        }
    };
    let remount = format!(
        "umount {mnt} && mount -o ro {dev} {mnt}",
        mnt = shell_quote(&entry.mountpoint),
        dev = shell_quote(&entry.device)
    );
    if !run_and_check(executor, &parsed.host, &remount) {
        return false;
    }
    // The brick failing is the point; the start itself may still report success
    if let Err(e) = volume_start(executor, mnode, volname, true) {
        error!("volume start {} force could not be run on {}: {}", volname, mnode, e);
        return false;
    }
    let bricks = vec![brick.to_string()];
    if !wait_for_bricks_to_be_offline(executor, mnode, volname, &bricks, poll) {
        error!("{} came online on a read-only filesystem", brick);
        return false;
    }
    let grep = format!(
        "grep -q {} {}",
        shell_quote("Read-only file system"),
        shell_quote(&paths.brick_log(&parsed.path))
    );
    run_and_check(executor, &parsed.host, &grep)
}

/// Make the filesystem at `mountpoint` on `host` writable again
pub fn remount_read_write(executor: &dyn RemoteExecutor, host: &str, mountpoint: &str) -> bool {
    let cmd = format!("mount -o remount,rw {}", shell_quote(mountpoint));
    run_and_check(executor, host, &cmd)
}

/// Restart glusterd on `nodes` and wait for it to run and for every server to reconnect to
/// `mnode`.
pub fn restart_glusterd_and_wait(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    nodes: &[String],
    servers: &[String],
    poll: Poll,
) -> bool {
    restart_glusterd(executor, nodes)
        && wait_for_glusterd_to_start(executor, nodes, poll)
        && wait_for_peers_to_connect(executor, mnode, servers, poll)
}
