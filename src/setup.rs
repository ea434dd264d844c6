//! Declarative volume setup and the matching cleanup.
//!
//! A [`VolumeConfig`] describes the volume a test wants: its geometry and the features to
//! switch on once it is started.  [`setup_volume`] drives the cluster there and
//! [`cleanup_volume`] takes it back out, bricks included.
use std::collections::BTreeMap;

use crate::brick::{delete_bricks, get_all_bricks};
use crate::executor::RemoteExecutor;
use crate::inventory::Inventory;
use crate::planner::form_bricks_list;
use crate::quota::{quota_enable, quota_limit_usage};
use crate::samba::{create_smb_users, share_volume_over_smb, SmbUsers};
use crate::snapshot::delete_all_snaps_of_volume;
use crate::succeeded;
use crate::tier::add_tier;
use crate::uss::enable_uss;
use crate::volume::{
    set_volume_options, volume_create, volume_delete, volume_exists, volume_start, volume_stop,
    Geometry,
};
use crate::wait::Poll;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default)]
    pub create_tier: bool,
    pub tier_type: Geometry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitUsage {
    pub path: String,
    pub size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub limit_usage: Option<LimitUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UssConfig {
    #[serde(default)]
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub users_info: SmbUsers,
}

/// The volume a test asks for.
///
/// ```json
/// {"name": "v1", "servers": ["srv1", "srv2", "srv3"],
///  "voltype": {"type": "replicated", "replica_count": 3},
///  "options": {"cluster.quorum-type": "auto"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    pub servers: Vec<String>,
    pub voltype: Geometry,
    #[serde(default)]
    pub tier: Option<TierConfig>,
    #[serde(default)]
    pub quota: Option<QuotaConfig>,
    #[serde(default)]
    pub uss: Option<UssConfig>,
    #[serde(default)]
    pub smb: Option<SmbConfig>,
    /// Servers the hot tier bricks are planned on.  Falls back to `servers` when empty.
    #[serde(default)]
    pub extra_servers: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl VolumeConfig {
    pub fn new(name: &str, servers: &[String], voltype: Geometry) -> VolumeConfig {
        VolumeConfig {
            name: name.to_string(),
            servers: servers.to_vec(),
            voltype,
            tier: None,
            quota: None,
            uss: None,
            smb: None,
            extra_servers: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    fn tier_servers(&self) -> &[String] {
        if self.extra_servers.is_empty() {
            &self.servers
        } else {
            &self.extra_servers
        }
    }
}

/// Create and start the volume described by `config`, then switch on its features.
///
/// A volume that already exists is left alone and counts as success.  The first failing step
/// aborts the setup.
pub fn setup_volume(
    executor: &dyn RemoteExecutor,
    inventory: &Inventory,
    mnode: &str,
    config: &VolumeConfig,
    force: bool,
) -> bool {
    let volname = config.name.as_str();
    if volume_exists(executor, mnode, volname) {
        info!("Volume {} already exists. Returning", volname);
        return true;
    }
    let count = match config.voltype.brick_count() {
        Ok(c) => c,
        Err(e) => {
            error!("Bad geometry for volume {}: {}", volname, e);
            return false;
        }
    };
    let bricks = match form_bricks_list(
        executor,
        mnode,
        volname,
        count,
        &config.servers,
        inventory,
        None,
    ) {
        Ok(b) => b,
        Err(e) => {
            error!("Unable to plan {} bricks for {}: {}", count, volname, e);
            return false;
        }
    };
    if !succeeded(
        volume_create(executor, mnode, volname, &bricks, &config.voltype, force),
        mnode,
        &format!("volume create {}", volname),
    ) {
        return false;
    }
    if !succeeded(
        volume_start(executor, mnode, volname, false),
        mnode,
        &format!("volume start {}", volname),
    ) {
        return false;
    }

    if let Some(ref tier) = config.tier {
        if tier.create_tier
            && !add_tier(
                executor,
                inventory,
                mnode,
                volname,
                &tier.tier_type,
                config.tier_servers(),
                force,
            )
        {
            error!("Unable to attach the hot tier to {}", volname);
            return false;
        }
    }

    if let Some(ref quota) = config.quota {
        if quota.enable {
            if !succeeded(
                quota_enable(executor, mnode, volname),
                mnode,
                &format!("quota enable {}", volname),
            ) {
                return false;
            }
            if let Some(ref limit) = quota.limit_usage {
                if !succeeded(
                    quota_limit_usage(executor, mnode, volname, &limit.path, &limit.size, None),
                    mnode,
                    &format!("quota limit-usage {} {}", volname, limit.path),
                ) {
                    return false;
                }
            }
        }
    }

    if let Some(ref uss) = config.uss {
        if uss.enable && !enable_uss(executor, mnode, volname) {
            error!("Unable to enable uss on {}", volname);
            return false;
        }
    }

    if let Some(ref smb) = config.smb {
        if smb.enable {
            if !smb.users_info.is_empty()
                && !create_smb_users(executor, &config.servers, &smb.users_info)
            {
                return false;
            }
            if !share_volume_over_smb(executor, mnode, volname, Poll::process_online()) {
                return false;
            }
        }
    }

    if !config.options.is_empty()
        && !set_volume_options(executor, mnode, volname, &config.options)
    {
        error!("Unable to set options {:?} on {}", config.options, volname);
        return false;
    }
    info!("Volume {} is set up with bricks {:?}", volname, bricks);
    true
}

/// Delete every snapshot of `volname`, force stop and delete it, then remove its brick
/// directories.  A volume that does not exist is already clean.
pub fn cleanup_volume(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    if !volume_exists(executor, mnode, volname) {
        info!("Volume {} does not exist. Nothing to clean up", volname);
        return true;
    }
    let bricks = match get_all_bricks(executor, mnode, volname) {
        Some(b) => b,
        None => {
            error!("Unable to list the bricks of {}", volname);
            return false;
        }
    };
    if !delete_all_snaps_of_volume(executor, mnode, volname) {
        error!("Unable to delete the snapshots of {}", volname);
        return false;
    }
    if !succeeded(
        volume_stop(executor, mnode, volname, true),
        mnode,
        &format!("volume stop {} force", volname),
    ) {
        return false;
    }
    if !succeeded(
        volume_delete(executor, mnode, volname),
        mnode,
        &format!("volume delete {}", volname),
    ) {
        return false;
    }
    if !delete_bricks(executor, &bricks) {
        error!("Unable to remove the brick directories of {}", volname);
        return false;
    }
    info!("Volume {} cleaned up", volname);
    true
}
