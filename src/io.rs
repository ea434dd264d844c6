//! Client workloads driven through the uploaded `file_dir_ops.py` generator.
use std::path::PathBuf;

use crate::executor::{all_succeeded, RemoteExecutor, RemoteFuture};
use crate::mount::Mount;
use crate::paths::ClusterPaths;
use crate::{shell_quote, stdout_of, GlusterError};

pub const FILE_DIR_OPS: &str = "file_dir_ops.py";

/// Shape of a `create_deep_dirs_with_files` run.
///
/// `dirname_start_num` numbers the top level directories; workloads sharing a mount must be
/// given ranges that do not overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepDirParams {
    pub dirname_start_num: usize,
    pub dir_depth: usize,
    pub dir_length: usize,
    pub max_num_of_dirs: usize,
    pub num_of_files: usize,
}

impl DeepDirParams {
    pub fn new(dirname_start_num: usize) -> DeepDirParams {
        DeepDirParams {
            dirname_start_num,
            dir_depth: 2,
            dir_length: 10,
            max_num_of_dirs: 5,
            num_of_files: 5,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "create_deep_dirs_with_files".to_string(),
            "--dirname-start-num".to_string(),
            self.dirname_start_num.to_string(),
            "--dir-depth".to_string(),
            self.dir_depth.to_string(),
            "--dir-length".to_string(),
            self.dir_length.to_string(),
            "--max-num-of-dirs".to_string(),
            self.max_num_of_dirs.to_string(),
            "--num-of-files".to_string(),
            self.num_of_files.to_string(),
        ]
    }
}

/// A workload running against one mount
pub struct IoProc {
    pub mount: Mount,
    pub future: RemoteFuture,
}

fn file_dir_ops_command(paths: &ClusterPaths, args: &[String], target: &str) -> String {
    let mut cmd = format!("python3 {}", shell_quote(&paths.script(FILE_DIR_OPS)));
    for arg in args {
        cmd.push(' ');
        cmd.push_str(&shell_quote(arg));
    }
    cmd.push(' ');
    cmd.push_str(&shell_quote(target));
    cmd
}

fn start(executor: &dyn RemoteExecutor, mount: &Mount, cmd: &str) -> Result<IoProc, GlusterError> {
    debug!("Starting io on {}:{}: {}", mount.client, mount.mountpoint, cmd);
    let future = executor.run_async(&mount.client, cmd)?;
    Ok(IoProc {
        mount: mount.clone(),
        future,
    })
}

/// Start a deep directory tree workload on `mount`
pub fn run_file_dir_ops(
    executor: &dyn RemoteExecutor,
    mount: &Mount,
    params: &DeepDirParams,
    paths: &ClusterPaths,
) -> Result<IoProc, GlusterError> {
    let cmd = file_dir_ops_command(paths, &params.args(), &mount.mountpoint);
    start(executor, mount, &cmd)
}

/// Start creating `num_of_files` files named after `base_file_name` in `dir` below `mount`
pub fn create_files(
    executor: &dyn RemoteExecutor,
    mount: &Mount,
    dir: &str,
    num_of_files: usize,
    base_file_name: &str,
    paths: &ClusterPaths,
) -> Result<IoProc, GlusterError> {
    let args = vec![
        "create_files".to_string(),
        "-f".to_string(),
        num_of_files.to_string(),
        "--base-file-name".to_string(),
        base_file_name.to_string(),
    ];
    let target = format!(
        "{}/{}",
        mount.mountpoint.trim_end_matches('/'),
        dir.trim_start_matches('/')
    );
    let cmd = file_dir_ops_command(paths, &args, target.trim_end_matches('/'));
    start(executor, mount, &cmd)
}

/// One deep directory workload per mount.  Mount `i` starts its directories at
/// `dirname_start_num + i * step`.
pub fn start_io_on_mounts(
    executor: &dyn RemoteExecutor,
    mounts: &[Mount],
    dirname_start_num: usize,
    step: usize,
    paths: &ClusterPaths,
) -> Result<Vec<IoProc>, GlusterError> {
    let mut procs = Vec::with_capacity(mounts.len());
    for (i, mount) in mounts.iter().enumerate() {
        let params = DeepDirParams::new(dirname_start_num + i * step);
        match run_file_dir_ops(executor, mount, &params, paths) {
            Ok(p) => procs.push(p),
            Err(e) => {
                error!("Unable to start io on {}:{}: {}", mount.client, mount.mountpoint, e);
                for p in procs.iter_mut() {
                    let _ = p.future.cancel();
                }
                return Err(e);
            }
        }
    }
    Ok(procs)
}

/// Join every workload.  True only when each one exited zero.
pub fn validate_io_procs(procs: &mut [IoProc]) -> bool {
    let mut ok = true;
    for p in procs.iter_mut() {
        let what = format!("io on {}", p.mount.mountpoint);
        match p.future.wait() {
            Ok(ref output) if output.success() => {
                info!("{} on {} completed", what, p.mount.client);
            }
            Ok(output) => {
                output.log_failure(&p.mount.client, &what);
                ok = false;
            }
            Err(e) => {
                error!("{} on {} was lost: {}", what, p.mount.client, e);
                ok = false;
            }
        }
    }
    ok
}

/// Join every workload without judging its exit status.  False only when one could not be
/// joined at all.
pub fn wait_for_io_to_complete(procs: &mut [IoProc]) -> bool {
    let mut ok = true;
    for p in procs.iter_mut() {
        match p.future.wait() {
            Ok(output) => {
                if !output.success() {
                    warn!(
                        "io on {}:{} exited {}",
                        p.mount.client, p.mount.mountpoint, output.exit
                    );
                }
            }
            Err(e) => {
                error!("io on {}:{} was lost: {}", p.mount.client, p.mount.mountpoint, e);
                ok = false;
            }
        }
    }
    ok
}

/// Copy the helper scripts to [`ClusterPaths::scripts_dir`] on every node
pub fn upload_scripts(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    scripts: &[PathBuf],
    paths: &ClusterPaths,
) -> bool {
    let mkdir = format!("mkdir -p {}", shell_quote(&paths.scripts_dir));
    if !all_succeeded(&mkdir, &executor.run_parallel(nodes, &mkdir)) {
        return false;
    }
    let mut ok = true;
    for node in nodes {
        for script in scripts {
            match executor.upload(node, script, &paths.scripts_dir) {
                Ok(()) => debug!("Uploaded {} to {}:{}", script.display(), node, paths.scripts_dir),
                Err(e) => {
                    error!("Unable to upload {} to {}: {}", script.display(), node, e);
                    ok = false;
                }
            }
        }
    }
    ok
}

/// Walk every mount with `ls -lR`, forcing lookups of the whole namespace
pub fn list_all_files_and_dirs_mounts(executor: &dyn RemoteExecutor, mounts: &[Mount]) -> bool {
    mounts.iter().all(|m| {
        let cmd = format!("ls -lR {}", shell_quote(&m.mountpoint));
        stdout_of(executor.run(&m.client, &cmd), &m.client, &cmd).is_some()
    })
}
