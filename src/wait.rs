//! Poll the cluster until it reaches a state or a deadline passes.
//!
//! A waiter returns `true` only when its predicate held on the last check, and `false` only
//! once the whole timeout has elapsed.  Timeouts are logged, never raised.
use std::cmp;
use std::thread;
use std::time::{Duration, Instant};

use crate::brick::{are_bricks_offline, are_bricks_online, get_all_bricks};
use crate::executor::RemoteExecutor;
use crate::fs::get_disk_usage;
use crate::heal::is_heal_complete;
use crate::mount::{is_volume_exported, ShareType};
use crate::peer::is_peer_connected;
use crate::rebalance::{get_rebalance_status, get_remove_brick_status};
use crate::service::{is_glusterd_running, GlusterdState};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_HEAL_TIMEOUT: Duration = Duration::from_secs(1800);
pub const DEFAULT_REBALANCE_TIMEOUT: Duration = Duration::from_secs(900);

/// How long to wait and how often to look
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poll {
    pub fn new(timeout: Duration, interval: Duration) -> Poll {
        Poll { timeout, interval }
    }

    pub fn with_timeout(timeout: Duration) -> Poll {
        Poll::new(timeout, DEFAULT_INTERVAL)
    }

    pub fn process_online() -> Poll {
        Poll::with_timeout(DEFAULT_PROCESS_TIMEOUT)
    }

    pub fn heal() -> Poll {
        Poll::with_timeout(DEFAULT_HEAL_TIMEOUT)
    }

    pub fn rebalance() -> Poll {
        Poll::with_timeout(DEFAULT_REBALANCE_TIMEOUT)
    }

    pub fn until<F>(&self, predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        poll_until(self.timeout, self.interval, predicate)
    }
}

/// Check `predicate` every `interval` until it holds or `timeout` has passed.  The last
/// check happens at the deadline.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if predicate() {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        thread::sleep(cmp::min(interval, timeout - elapsed));
    }
}

fn finish(waiter: &str, subject: &str, ok: bool, poll: &Poll) -> bool {
    if ok {
        info!("{}: {} reached the expected state", waiter, subject);
    } else {
        error!(
            "{}: {} did not reach the expected state within {:?}",
            waiter, subject, poll.timeout
        );
    }
    ok
}

/// Every brick of `volname` reports status 1 with a live pid
pub fn wait_for_volume_process_to_be_online(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| match get_all_bricks(executor, mnode, volname) {
        Some(bricks) => !bricks.is_empty() && are_bricks_online(executor, mnode, volname, &bricks),
        None => false,
    });
    finish("wait_for_volume_process_to_be_online", volname, ok, &poll)
}

pub fn wait_for_bricks_to_be_online(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    poll: Poll,
) -> bool {
    let ok = poll.until(|| are_bricks_online(executor, mnode, volname, bricks));
    finish("wait_for_bricks_to_be_online", volname, ok, &poll)
}

pub fn wait_for_bricks_to_be_offline(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    poll: Poll,
) -> bool {
    let ok = poll.until(|| are_bricks_offline(executor, mnode, volname, bricks));
    finish("wait_for_bricks_to_be_offline", volname, ok, &poll)
}

/// Rebalance reports `completed` on every node
pub fn wait_for_rebalance_to_complete(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| match get_rebalance_status(executor, mnode, volname) {
        Some(status) => {
            let failed = status.failed_nodes();
            if !failed.is_empty() {
                warn!("Rebalance of {} failed on {:?}", volname, failed);
            }
            status.is_completed()
        }
        None => false,
    });
    finish("wait_for_rebalance_to_complete", volname, ok, &poll)
}

pub fn wait_for_remove_brick_to_complete(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    poll: Poll,
) -> bool {
    let ok = poll.until(|| match get_remove_brick_status(executor, mnode, volname, bricks) {
        Some(status) => status.is_completed(),
        None => false,
    });
    finish("wait_for_remove_brick_to_complete", volname, ok, &poll)
}

/// Heal info shows no pending entries on any brick
pub fn monitor_heal_completion(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| is_heal_complete(executor, mnode, volname));
    finish("monitor_heal_completion", volname, ok, &poll)
}

pub fn wait_for_nfs_ganesha_volume_to_get_exported(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| is_volume_exported(executor, mnode, volname, ShareType::Nfs));
    finish("wait_for_nfs_ganesha_volume_to_get_exported", volname, ok, &poll)
}

pub fn wait_for_nfs_ganesha_volume_to_get_unexported(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| !is_volume_exported(executor, mnode, volname, ShareType::Nfs));
    finish("wait_for_nfs_ganesha_volume_to_get_unexported", volname, ok, &poll)
}

/// The filesystem holding `path` on `client` is at least `percent` full.  A timeout is a
/// failure.
pub fn check_if_dir_is_filled(
    executor: &dyn RemoteExecutor,
    client: &str,
    path: &str,
    percent: u32,
    poll: Poll,
) -> bool {
    let ok = poll.until(|| match get_disk_usage(executor, client, path) {
        Some(usage) => {
            debug!("{} on {} is {}% used", path, client, usage.use_percent);
            usage.use_percent >= percent
        }
        None => false,
    });
    finish("check_if_dir_is_filled", path, ok, &poll)
}

pub fn wait_for_peers_to_connect(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    servers: &[String],
    poll: Poll,
) -> bool {
    let ok = poll.until(|| is_peer_connected(executor, mnode, servers));
    finish("wait_for_peers_to_connect", mnode, ok, &poll)
}

pub fn wait_for_glusterd_to_start(executor: &dyn RemoteExecutor, nodes: &[String], poll: Poll) -> bool {
    let ok = poll.until(|| is_glusterd_running(executor, nodes) == GlusterdState::Running);
    finish("wait_for_glusterd_to_start", &nodes.join(","), ok, &poll)
}

/// glusterd runs everywhere and every server is a connected peer of `mnode`
pub fn wait_for_cluster_to_be_healthy(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    servers: &[String],
    poll: Poll,
) -> bool {
    let ok = poll.until(|| {
        is_glusterd_running(executor, servers) == GlusterdState::Running
            && is_peer_connected(executor, mnode, servers)
    });
    finish("wait_for_cluster_to_be_healthy", mnode, ok, &poll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::mock::MockExecutor;

    fn quick() -> Poll {
        Poll::new(Duration::from_millis(300), Duration::from_millis(20))
    }

    #[test]
    fn test_poll_until_success_and_timeout() {
        let mut calls = 0;
        assert!(poll_until(Duration::from_secs(5), Duration::from_millis(1), || {
            calls += 1;
            calls == 3
        }));
        assert_eq!(calls, 3);

        let start = Instant::now();
        let timeout = Duration::from_millis(120);
        assert!(!poll_until(timeout, Duration::from_millis(50), || false));
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_poll_checks_at_deadline() {
        // The interval is longer than the timeout; the second check still happens
        let mut calls = 0;
        assert!(!poll_until(Duration::from_millis(30), Duration::from_secs(60), || {
            calls += 1;
            false
        }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_dir_filled_times_out_false() {
        let mock = MockExecutor::new();
        mock.on(
            "df -h",
            CommandOutput::ok("Filesystem Size Used Avail Use% Mounted on\nsrv1:/v1 20G 2G 18G 10% /mnt/v1\n"),
        );
        assert!(!check_if_dir_is_filled(&mock, "cli1", "/mnt/v1", 50, quick()));
        assert!(check_if_dir_is_filled(&mock, "cli1", "/mnt/v1", 10, quick()));
    }

    #[test]
    fn test_glusterd_waiter() {
        let mock = MockExecutor::new();
        mock.on("systemctl is-active glusterd", CommandOutput::fail(3, "inactive"))
            .on("systemctl is-active glusterd", CommandOutput::ok("active"));
        mock.on("pidof glusterd", CommandOutput::fail(1, ""));
        assert!(wait_for_glusterd_to_start(&mock, &["srv1".to_string()], quick()));
        assert_eq!(mock.count("systemctl is-active glusterd"), 2);
    }
}
