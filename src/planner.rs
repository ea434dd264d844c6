//! Brick selection and subvolume grouping.
//!
//! The planning itself ([`plan_bricks`], [`chunk_bricks`], [`subvolumes_of`]) is pure so it
//! can be checked without a cluster; the remaining functions gather the cluster state it
//! needs.
use std::collections::BTreeMap;

use crate::executor::RemoteExecutor;
use crate::fs::{parse_proc_mounts, MountEntry};
use crate::inventory::Inventory;
use crate::volume::{
    as_count, get_volume, get_volume_info, split_brick, TierBricks, VolumeInfo, VolumeType,
};
use crate::GlusterError;

/// Bricks of a volume grouped into subvolumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subvolumes {
    pub hot: Vec<Vec<String>>,
    pub cold: Vec<Vec<String>>,
    pub plain: Vec<Vec<String>>,
}

impl Subvolumes {
    /// Every group, hot tier first
    pub fn all(&self) -> Vec<Vec<String>> {
        let mut all = self.hot.clone();
        all.extend(self.cold.iter().cloned());
        all.extend(self.plain.iter().cloned());
        all
    }
}

/// Pick `count` bricks round robin across `servers`.
///
/// `free` holds the unused brick mounts of each server.  Each turn takes the lexically first
/// remaining mount of the current server; exhausted servers are skipped.  Brick directories
/// are numbered from `start_index` and named after `dirname`, falling back to `volname` when
/// `dirname` is missing or contains whitespace.
pub fn plan_bricks(
    volname: &str,
    count: usize,
    servers: &[String],
    free: &BTreeMap<String, Vec<String>>,
    start_index: usize,
    dirname: Option<&str>,
) -> Result<Vec<String>, GlusterError> {
    let mut remaining: Vec<(String, Vec<String>)> = servers
        .iter()
        .map(|server| {
            let mut mounts = free.get(server).cloned().unwrap_or_default();
            mounts.sort();
            mounts.dedup();
            // Consumed from the back
            mounts.reverse();
            (server.clone(), mounts)
        })
        .collect();
    let available: usize = remaining.iter().map(|(_, m)| m.len()).sum();
    if available < count {
        error!(
            "Volume {} needs {} bricks but only {} are unused on {:?}",
            volname, count, available, servers
        );
        return Err(GlusterError::InsufficientBricks {
            requested: count,
            available,
        });
    }

    let prefix = match dirname {
        Some(d) if !d.is_empty() && !d.chars().any(char::is_whitespace) => d,
        Some(d) => {
            if !d.is_empty() {
                warn!("Brick dirname {:?} contains whitespace, using {}", d, volname);
            }
            volname
        }
        None => volname,
    };

    let mut bricks: Vec<String> = Vec::with_capacity(count);
    let mut turn = 0;
    while bricks.len() < count {
        let (ref server, ref mut mounts) = remaining[turn % servers.len()];
        turn += 1;
        if let Some(mount) = mounts.pop() {
            bricks.push(format!(
                "{}:{}/{}_brick{}",
                server,
                mount.trim_end_matches('/'),
                prefix,
                start_index + bricks.len()
            ));
        }
    }
    Ok(bricks)
}

/// Split `bricks` into groups of `size`.  A list that does not divide evenly is malformed.
pub fn chunk_bricks(bricks: &[String], size: usize) -> Option<Vec<Vec<String>>> {
    if size == 0 || bricks.len() % size != 0 {
        error!(
            "{} bricks cannot be grouped into subvolumes of {}",
            bricks.len(),
            size
        );
        return None;
    }
    Some(bricks.chunks(size).map(|c| c.to_vec()).collect())
}

fn group_size(vol_type: VolumeType, replica_count: &str, disperse_count: &str) -> usize {
    if vol_type.is_replicated() {
        as_count(replica_count).max(1)
    } else if vol_type.is_dispersed() {
        as_count(disperse_count).max(1)
    } else {
        1
    }
}

fn tier_groups(tier: &TierBricks) -> Option<Vec<Vec<String>>> {
    let names: Vec<String> = tier.bricks.iter().map(|b| b.name.clone()).collect();
    let size = group_size(
        VolumeType::new(&tier.brick_type),
        &tier.replica_count,
        &tier.disperse_count,
    );
    chunk_bricks(&names, size)
}

/// Partition the bricks of a parsed volume into subvolumes
pub fn subvolumes_of(info: &VolumeInfo) -> Option<Subvolumes> {
    let mut subvols = Subvolumes::default();
    if info.is_tiered() {
        if let Some(ref hot) = info.bricks.hot {
            subvols.hot = tier_groups(hot)?;
        }
        if let Some(ref cold) = info.bricks.cold {
            subvols.cold = tier_groups(cold)?;
        }
        return Some(subvols);
    }
    let names: Vec<String> = info.bricks.bricks.iter().map(|b| b.name.clone()).collect();
    let size = group_size(info.volume_type(), &info.replica_count, &info.disperse_count);
    subvols.plain = chunk_bricks(&names, size)?;
    Some(subvols)
}

/// Subvolumes of `volname` as the cluster reports them now
pub fn get_subvols(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Option<Subvolumes> {
    let info = get_volume(executor, mnode, volname)?;
    subvolumes_of(&info)
}

/// Brick mounts under `brick_root`, sorted
pub fn brick_mounts(entries: &[MountEntry], brick_root: &str) -> Vec<String> {
    let root = brick_root.trim_end_matches('/');
    let mut mounts: Vec<String> = entries
        .iter()
        .filter(|e| e.mountpoint.starts_with(&format!("{}/", root)))
        .map(|e| e.mountpoint.clone())
        .collect();
    mounts.sort();
    mounts.dedup();
    mounts
}

/// Mounts in `mounts` that no brick in `used` (`host:/path`) on `server` lives in
pub fn unused_mounts(server: &str, mounts: &[String], used: &[String]) -> Vec<String> {
    let used_paths: Vec<&str> = used
        .iter()
        .filter_map(|b| split_brick(b))
        .filter(|(host, _)| *host == server)
        .map(|(_, path)| path)
        .collect();
    mounts
        .iter()
        .filter(|m| {
            let prefix = format!("{}/", m.trim_end_matches('/'));
            !used_paths
                .iter()
                .any(|p| *p == m.as_str() || p.starts_with(&prefix))
        })
        .cloned()
        .collect()
}

/// Free brick mounts of each server: the `/proc/mounts` entries under its `brick_root`
/// minus those hosting a brick of any existing volume.
pub fn unused_bricks_per_server(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    servers: &[String],
    inventory: &Inventory,
) -> Result<BTreeMap<String, Vec<String>>, GlusterError> {
    let used: Vec<String> = match get_volume_info(executor, mnode, None) {
        Some(volumes) => volumes.values().flat_map(|v| v.all_bricks()).collect(),
        None => {
            return Err(GlusterError::ParseError(format!(
                "unable to read volume info from {}",
                mnode
            )))
        }
    };
    let mut unused = BTreeMap::new();
    for server in servers {
        let info = inventory.server_info(server).ok_or_else(|| {
            GlusterError::PreconditionViolation(format!("{} is not in the inventory", server))
        })?;
        let output = executor
            .run(server, "cat /proc/mounts")?
            .checked(server, "cat /proc/mounts")?;
        let entries = parse_proc_mounts(&output.stdout);
        let mounts = brick_mounts(&entries, &info.brick_root);
        let free = unused_mounts(server, &mounts, &used);
        debug!("Unused brick mounts on {}: {:?}", server, free);
        unused.insert(server.clone(), free);
    }
    Ok(unused)
}

/// Plan `count` new bricks for `volname`.  Numbering continues from the volume's current
/// brick count, or 0 when it does not exist yet.
pub fn form_bricks_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    count: usize,
    servers: &[String],
    inventory: &Inventory,
    dirname: Option<&str>,
) -> Result<Vec<String>, GlusterError> {
    let start_index = match get_volume(executor, mnode, volname) {
        Some(info) => as_count(&info.brick_count),
        None => 0,
    };
    let free = unused_bricks_per_server(executor, mnode, servers, inventory)?;
    let bricks = plan_bricks(volname, count, servers, &free, start_index, dirname)?;
    info!("Planned bricks for {}: {:?}", volname, bricks);
    Ok(bricks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{BrickEntry, BrickLayout};

    fn free(servers: &[&str], per_server: usize) -> BTreeMap<String, Vec<String>> {
        servers
            .iter()
            .map(|s| {
                (
                    s.to_string(),
                    (0..per_server).map(|i| format!("/bricks/brick{}", i)).collect(),
                )
            })
            .collect()
    }

    fn names(servers: &[&str]) -> Vec<String> {
        servers.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_round_robin() {
        let servers = names(&["srv1", "srv2", "srv3"]);
        let bricks = plan_bricks("v1", 4, &servers, &free(&["srv1", "srv2", "srv3"], 2), 0, None).unwrap();
        assert_eq!(
            bricks,
            vec![
                "srv1:/bricks/brick0/v1_brick0",
                "srv2:/bricks/brick0/v1_brick1",
                "srv3:/bricks/brick0/v1_brick2",
                "srv1:/bricks/brick1/v1_brick3",
            ]
        );
    }

    #[test]
    fn test_plan_skips_exhausted_servers() {
        let servers = names(&["srv1", "srv2"]);
        let mut pool = free(&["srv1"], 3);
        pool.insert("srv2".to_string(), vec!["/bricks/brick7".to_string()]);
        let bricks = plan_bricks("v1", 4, &servers, &pool, 6, Some("data dir")).unwrap();
        assert_eq!(
            bricks,
            vec![
                "srv1:/bricks/brick0/v1_brick6",
                "srv2:/bricks/brick7/v1_brick7",
                "srv1:/bricks/brick1/v1_brick8",
                "srv1:/bricks/brick2/v1_brick9",
            ]
        );
    }

    #[test]
    fn test_plan_insufficient() {
        let servers = names(&["srv1", "srv2"]);
        match plan_bricks("v1", 5, &servers, &free(&["srv1", "srv2"], 2), 0, None) {
            Err(GlusterError::InsufficientBricks {
                requested,
                available,
            }) => {
                assert_eq!(requested, 5);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plan_never_reuses() {
        let servers = names(&["srv1", "srv2", "srv3", "srv4", "srv5", "srv6"]);
        let pool = free(&["srv1", "srv2", "srv3", "srv4", "srv5", "srv6"], 4);
        for n in 1..=24 {
            let bricks = plan_bricks("v1", n, &servers, &pool, 0, Some("dir")).unwrap();
            assert_eq!(bricks.len(), n);
            let mounts: Vec<String> = bricks
                .iter()
                .map(|b| b.rsplitn(2, '/').nth(1).unwrap().to_string())
                .collect();
            let mut unique = mounts.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), n);
        }
        assert!(plan_bricks("v1", 25, &servers, &pool, 0, None).is_err());
    }

    fn entry(name: &str) -> BrickEntry {
        BrickEntry {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_subvolumes_replicated() {
        let info = VolumeInfo {
            type_str: "Distributed-Replicate".to_string(),
            replica_count: "3".to_string(),
            bricks: BrickLayout {
                bricks: (0..6).map(|i| entry(&format!("srv{}:/b/v_brick{}", i, i))).collect(),
                ..Default::default()
            },
            ..Default::default()
        };
        let subvols = subvolumes_of(&info).unwrap();
        assert_eq!(subvols.plain.len(), 2);
        assert_eq!(subvols.plain[1][0], "srv3:/b/v_brick3");
        assert!(subvols.hot.is_empty());

        let mut odd = info.clone();
        odd.bricks.bricks.pop();
        assert!(subvolumes_of(&odd).is_none());
    }

    #[test]
    fn test_subvolumes_distribute_and_tier() {
        let info = VolumeInfo {
            type_str: "Distribute".to_string(),
            bricks: BrickLayout {
                bricks: (0..3).map(|i| entry(&format!("srv1:/b/{}", i))).collect(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(subvolumes_of(&info).unwrap().plain.len(), 3);

        let tiered = VolumeInfo {
            type_str: "Tier".to_string(),
            bricks: BrickLayout {
                hot: Some(TierBricks {
                    brick_type: "Replicate".to_string(),
                    replica_count: "2".to_string(),
                    bricks: vec![entry("srv1:/h/0"), entry("srv2:/h/1")],
                    ..Default::default()
                }),
                cold: Some(TierBricks {
                    brick_type: "Disperse".to_string(),
                    disperse_count: "3".to_string(),
                    bricks: (0..3).map(|i| entry(&format!("srv{}:/c/{}", i, i))).collect(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let subvols = subvolumes_of(&tiered).unwrap();
        assert_eq!(subvols.hot, vec![vec!["srv1:/h/0".to_string(), "srv2:/h/1".to_string()]]);
        assert_eq!(subvols.cold.len(), 1);
        assert_eq!(subvols.cold[0].len(), 3);
        assert!(subvols.plain.is_empty());
        assert_eq!(subvols.all().len(), 2);
    }

    #[test]
    fn test_unused_mounts() {
        let mounts = vec![
            "/bricks/brick0".to_string(),
            "/bricks/brick1".to_string(),
            "/bricks/brick10".to_string(),
        ];
        let used = vec![
            "srv1:/bricks/brick1/v1_brick0".to_string(),
            "srv2:/bricks/brick0/v1_brick1".to_string(),
        ];
        assert_eq!(
            unused_mounts("srv1", &mounts, &used),
            vec!["/bricks/brick0".to_string(), "/bricks/brick10".to_string()]
        );
    }
}
