//! User serviceable snapshots (`features.uss`) and the snapshot daemon serving them.
use crate::executor::RemoteExecutor;
use crate::volume::{get_volume_options, get_volume_status, set_volume_option};

pub fn enable_uss(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    set_volume_option(executor, mnode, volname, "features.uss", "enable")
}

pub fn disable_uss(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    set_volume_option(executor, mnode, volname, "features.uss", "disable")
}

pub fn is_uss_enabled(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    match get_volume_options(executor, mnode, volname, Some("features.uss")) {
        Some(options) => match options.get("features.uss") {
            Some(value) => value == "enable" || value == "on",
            None => false,
        },
        None => {
            error!("Unable to read features.uss of {}", volname);
            false
        }
    }
}

/// A snapshot daemon is online on every node that reports one
pub fn is_snapd_running(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    let status = match get_volume_status(executor, mnode, Some(volname), Some("snapd")) {
        Some(s) => s,
        None => {
            error!("Unable to get snapd status of {}", volname);
            return false;
        }
    };
    let nodes = match status.get(volname) {
        Some(n) => n,
        None => return false,
    };
    let mut seen = false;
    for (node, endpoints) in nodes {
        if let Some(snapd) = endpoints.get("Snapshot Daemon") {
            seen = true;
            if !snapd.is_online() {
                error!("snapd of {} is not running on {}", volname, node);
                return false;
            }
        }
    }
    if !seen {
        error!("volume status of {} lists no snapshot daemon", volname);
    }
    seen
}
