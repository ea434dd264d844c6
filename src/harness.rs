//! Per-test wiring: an inventory, an executor, and the teardown steps a test has queued.
//!
//! A test builds one [`Harness`], sets its volume up through it and calls
//! [`Harness::teardown`] when done.  Every setup helper that leaves state behind registers
//! the step that undoes it, so teardown runs in reverse order of setup.
use std::sync::Arc;

use crate::executor::{RemoteExecutor, SshExecutor};
use crate::inventory::Inventory;
use crate::mount::Mount;
use crate::paths::ClusterPaths;
use crate::setup::{cleanup_volume, setup_volume, VolumeConfig};
use crate::wait::{wait_for_volume_process_to_be_online, Poll};
use crate::{run_and_check, shell_quote, GlusterError};

/// An undo action queued by a test
pub type TeardownStep = Box<dyn FnOnce(&dyn RemoteExecutor) -> Result<(), GlusterError>>;

pub struct Harness {
    inventory: Inventory,
    executor: Arc<dyn RemoteExecutor>,
    paths: ClusterPaths,
    process_poll: Poll,
    teardown: Vec<(String, TeardownStep)>,
}

impl Harness {
    pub fn new(inventory: Inventory, executor: Arc<dyn RemoteExecutor>) -> Harness {
        let paths = inventory.paths().clone();
        Harness {
            inventory,
            executor,
            paths,
            process_poll: Poll::process_online(),
            teardown: Vec::new(),
        }
    }

    /// A harness talking to the inventory's nodes over ssh
    pub fn over_ssh(inventory: Inventory) -> Harness {
        let executor = SshExecutor::new(inventory.user(), inventory.ssh_options());
        Harness::new(inventory, Arc::new(executor))
    }

    /// How long setup waits for brick processes after starting a volume
    pub fn with_process_poll(mut self, poll: Poll) -> Harness {
        self.process_poll = poll;
        self
    }

    pub fn executor(&self) -> &dyn RemoteExecutor {
        self.executor.as_ref()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn paths(&self) -> &ClusterPaths {
        &self.paths
    }

    pub fn mnode(&self) -> &str {
        self.inventory.mnode()
    }

    /// Queue `step` to run at teardown.  Steps run last registered first.
    pub fn register_teardown<F>(&mut self, name: &str, step: F)
    where
        F: FnOnce(&dyn RemoteExecutor) -> Result<(), GlusterError> + 'static,
    {
        debug!("Registered teardown step {}", name);
        self.teardown.push((name.to_string(), Box::new(step)));
    }

    /// Steps still queued
    pub fn pending_teardown(&self) -> Vec<String> {
        self.teardown.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Set up `config` and wait for its processes.  Cleanup of the volume is queued for
    /// teardown once it exists.
    pub fn setup_volume(&mut self, config: &VolumeConfig) -> Result<(), GlusterError> {
        let mnode = self.mnode().to_string();
        let volname = config.name.clone();
        if !setup_volume(self.executor(), &self.inventory, &mnode, config, false) {
            return Err(GlusterError::ExecutionError(format!(
                "setup of volume {} failed",
                volname
            )));
        }
        let cleanup_node = mnode.clone();
        let cleanup_vol = volname.clone();
        self.register_teardown(&format!("cleanup volume {}", volname), move |exec| {
            if cleanup_volume(exec, &cleanup_node, &cleanup_vol) {
                Ok(())
            } else {
                Err(GlusterError::ExecutionError(format!(
                    "cleanup of volume {} failed",
                    cleanup_vol
                )))
            }
        });
        if !wait_for_volume_process_to_be_online(self.executor(), &mnode, &volname, self.process_poll) {
            return Err(GlusterError::ExecutionError(format!(
                "processes of volume {} did not come online",
                volname
            )));
        }
        Ok(())
    }

    /// Set up `config`, then mount it on every entry of `mounts`.  Each successful mount
    /// queues its unmount.
    pub fn setup_volume_and_mount(
        &mut self,
        config: &VolumeConfig,
        mounts: &[Mount],
    ) -> Result<(), GlusterError> {
        self.setup_volume(config)?;
        for mount in mounts {
            let output = mount.mount(self.executor())?;
            if !output.success() {
                return Err(GlusterError::ExecutionError(format!(
                    "mounting {} on {}:{} failed",
                    mount.volname, mount.client, mount.mountpoint
                )));
            }
            let m = mount.clone();
            self.register_teardown(
                &format!("unmount {}:{}", mount.client, mount.mountpoint),
                move |exec| {
                    if unmount(exec, &m) {
                        Ok(())
                    } else {
                        Err(GlusterError::ExecutionError(format!(
                            "unmount of {}:{} failed",
                            m.client, m.mountpoint
                        )))
                    }
                },
            );
        }
        info!("Volume {} is set up and mounted on {} clients", config.name, mounts.len());
        Ok(())
    }

    /// Run every queued step, last registered first.  A failing step does not stop the ones
    /// after it.
    pub fn teardown(&mut self) -> Result<(), GlusterError> {
        let mut failed = Vec::new();
        while let Some((name, step)) = self.teardown.pop() {
            info!("Teardown: {}", name);
            if let Err(e) = step(self.executor.as_ref()) {
                error!("Teardown step {} failed: {}", name, e);
                failed.push(name);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(GlusterError::ExecutionError(format!(
                "teardown steps failed: {}",
                failed.join(", ")
            )))
        }
    }
}

fn unmount(executor: &dyn RemoteExecutor, mount: &Mount) -> bool {
    match mount.umount(executor) {
        Ok(ref output) if output.success() => run_and_check(
            executor,
            &mount.client,
            &format!("rm -rf {}", shell_quote(&mount.mountpoint)),
        ),
        Ok(_) => false,
        Err(e) => {
            error!("umount of {}:{} could not be run: {}", mount.client, mount.mountpoint, e);
            false
        }
    }
}

/// Unmount every entry of `mounts` and clean the volume up.  Every mount is attempted even
/// when an earlier one fails.
pub fn unmount_and_cleanup_volume(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    mounts: &[Mount],
) -> bool {
    let mut ok = true;
    for mount in mounts {
        ok &= unmount(executor, mount);
    }
    if !ok {
        error!("Unable to unmount every mount of {}", volname);
    }
    cleanup_volume(executor, mnode, volname) && ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::mock::MockExecutor;
    use crate::mount::Protocol;
    use crate::volume::tests::VOLUME_INFO_2X3;
    use crate::volume::Geometry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn inventory() -> Inventory {
        Inventory::from_json(
            r#"{"servers": ["srv1", "srv2", "srv3", "srv4", "srv5", "srv6"],
                "clients": ["cli1"],
                "servers_info": {
                    "srv1": {"brick_root": "/bricks"}, "srv2": {"brick_root": "/bricks"},
                    "srv3": {"brick_root": "/bricks"}, "srv4": {"brick_root": "/bricks"},
                    "srv5": {"brick_root": "/bricks"}, "srv6": {"brick_root": "/bricks"}}}"#,
        )
        .unwrap()
    }

    fn status_all_online() -> String {
        let nodes: String = (0..6)
            .map(|i| {
                format!(
                    "<node><hostname>srv{}</hostname><path>/bricks/brick0/v1_brick{}</path>\
                     <peerid>p{}</peerid><status>1</status><port>4915{}</port><pid>{}</pid></node>",
                    i + 1,
                    i,
                    i,
                    i,
                    3000 + i
                )
            })
            .collect();
        format!(
            "<cliOutput><opRet>0</opRet><volStatus><volumes><volume><volName>v1</volName>{}\
             </volume></volumes></volStatus></cliOutput>",
            nodes
        )
    }

    fn cluster() -> Arc<MockExecutor> {
        let mock = MockExecutor::new();
        mock.on("gluster volume list", CommandOutput::ok("No volumes present in cluster\n"))
            .on("gluster volume list", CommandOutput::ok("v1\n"));
        mock.on(
            "gluster volume info --xml",
            CommandOutput::ok(
                "<cliOutput><opRet>0</opRet><volInfo><volumes><count>0</count></volumes></volInfo></cliOutput>",
            ),
        );
        mock.on("gluster volume info v1", CommandOutput::fail(1, "Volume v1 does not exist"))
            .on("gluster volume info v1", CommandOutput::ok(VOLUME_INFO_2X3));
        mock.on("gluster volume status v1", CommandOutput::ok(&status_all_online()));
        mock.on(
            "gluster snapshot list",
            CommandOutput::ok("<cliOutput><opRet>0</opRet><snapList><count>0</count></snapList></cliOutput>"),
        );
        let mounts: String = (0..2)
            .map(|i| format!("/dev/vg/brick{i} /bricks/brick{i} xfs rw 0 0\n", i = i))
            .collect();
        mock.on("cat /proc/mounts", CommandOutput::ok(&mounts));
        Arc::new(mock)
    }

    fn client_mount() -> Mount {
        Mount {
            client: "cli1".to_string(),
            mountpoint: "/mnt/v1".to_string(),
            server: "srv1".to_string(),
            volname: "v1".to_string(),
            protocol: Protocol::Glusterfs,
            options: None,
        }
    }

    #[test]
    fn test_teardown_is_lifo_and_runs_every_step() {
        let mock = Arc::new(MockExecutor::new());
        let mut harness = Harness::new(inventory(), mock.clone());
        let order = Rc::new(RefCell::new(Vec::new()));
        for name in &["first", "second", "third"] {
            let order = order.clone();
            let name = name.to_string();
            harness.register_teardown(&name.clone(), move |_| {
                order.borrow_mut().push(name.clone());
                if name == "second" {
                    Err(GlusterError::ExecutionError("boom".to_string()))
                } else {
                    Ok(())
                }
            });
        }
        match harness.teardown() {
            Err(GlusterError::ExecutionError(msg)) => assert!(msg.contains("second")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*order.borrow(), vec!["third", "second", "first"]);
        assert!(harness.pending_teardown().is_empty());
        assert!(harness.teardown().is_ok());
    }

    #[test]
    fn test_setup_mount_and_teardown() {
        let mock = cluster();
        let mut harness = Harness::new(inventory(), mock.clone())
            .with_process_poll(Poll::new(Duration::from_secs(0), Duration::from_millis(10)));
        let config = VolumeConfig::new(
            "v1",
            harness.inventory().servers(),
            Geometry::distributed_replicated(2, 3),
        );
        harness
            .setup_volume_and_mount(&config, &[client_mount()])
            .unwrap();
        assert_eq!(
            harness.pending_teardown(),
            vec!["cleanup volume v1", "unmount cli1:/mnt/v1"]
        );
        assert!(mock
            .commands_on("cli1")
            .iter()
            .any(|c| c.starts_with("mount -t glusterfs") && c.ends_with("srv1:/v1 /mnt/v1")));

        harness.teardown().unwrap();
        let cmds = mock.commands();
        let umount = cmds.iter().position(|c| c == "umount /mnt/v1").unwrap();
        let stop = cmds
            .iter()
            .position(|c| c == "gluster volume stop v1 force --mode=script")
            .unwrap();
        assert!(umount < stop);
        assert_eq!(mock.count("rm -rf /bricks/brick0/v1_brick"), 6);
    }

    #[test]
    fn test_failed_setup_queues_nothing() {
        let mock = cluster();
        mock.on("gluster volume create", CommandOutput::fail(1, "failed"));
        let mut harness = Harness::new(inventory(), mock.clone());
        let config = VolumeConfig::new("v1", harness.inventory().servers(), Geometry::replicated(3));
        assert!(harness.setup_volume_and_mount(&config, &[client_mount()]).is_err());
        assert!(harness.pending_teardown().is_empty());
        assert_eq!(mock.count("mount -t"), 0);
    }

    #[test]
    fn test_unmount_and_cleanup_keeps_going() {
        let mock = MockExecutor::new();
        mock.on("umount", CommandOutput::fail(32, "target is busy"));
        mock.on("gluster volume list", CommandOutput::ok("No volumes present in cluster\n"));
        assert!(!unmount_and_cleanup_volume(&mock, "srv1", "v1", &[client_mount()]));
        assert_eq!(mock.count("gluster volume list"), 1);
        assert_eq!(mock.count("rm -rf /mnt/v1"), 0);
    }
}
