//! Content checksums of brick and mount trees via `arequal-checksum`.
use crate::brick::Brick;
use crate::executor::RemoteExecutor;
use crate::mount::Mount;
use crate::{shell_quote, stdout_of};

/// Internal trees skipped on bricks
const IGNORED: [&str; 3] = [".glusterfs", ".landfill", ".trashcan"];

/// The `Total` checksum from the last line of arequal output
pub fn parse_arequal_total(output: &str) -> Option<String> {
    let last = output.lines().rev().find(|l| !l.trim().is_empty())?;
    let idx = last.rfind(':')?;
    let total = last[idx + 1..].trim();
    if total.is_empty() {
        return None;
    }
    Some(total.to_string())
}

fn arequal_cmd(path: &str, ignore_internal: bool) -> String {
    let mut cmd = format!("arequal-checksum -p {}", shell_quote(path));
    if ignore_internal {
        for dir in IGNORED.iter() {
            cmd.push_str(" -i ");
            cmd.push_str(dir);
        }
    }
    cmd
}

/// Checksum every brick.  The flag is false when any brick could not be probed; its slot
/// then holds an empty string.
pub fn collect_bricks_arequal(executor: &dyn RemoteExecutor, bricks: &[String]) -> (bool, Vec<String>) {
    let mut ok = true;
    let mut outputs = Vec::with_capacity(bricks.len());
    for b in bricks {
        let brick = match Brick::parse(b) {
            Some(brick) => brick,
            None => {
                error!("{} is not a host:/path brick", b);
                ok = false;
                outputs.push(String::new());
                continue;
            }
        };
        let cmd = arequal_cmd(&brick.path, true);
        match stdout_of(executor.run(&brick.host, &cmd), &brick.host, &cmd) {
            Some(out) => outputs.push(out),
            None => {
                ok = false;
                outputs.push(String::new());
            }
        }
    }
    (ok, outputs)
}

/// Checksum each mount, or `path` below each mount
pub fn collect_mounts_arequal(
    executor: &dyn RemoteExecutor,
    mounts: &[Mount],
    path: Option<&str>,
) -> (bool, Vec<String>) {
    let mut ok = true;
    let mut outputs = Vec::with_capacity(mounts.len());
    for mount in mounts {
        let target = match path {
            Some(p) => format!(
                "{}/{}",
                mount.mountpoint.trim_end_matches('/'),
                p.trim_start_matches('/')
            ),
            None => mount.mountpoint.clone(),
        };
        let cmd = arequal_cmd(&target, false);
        match stdout_of(executor.run(&mount.client, &cmd), &mount.client, &cmd) {
            Some(out) => outputs.push(out),
            None => {
                ok = false;
                outputs.push(String::new());
            }
        }
    }
    (ok, outputs)
}

fn totals(outputs: &[String]) -> Option<Vec<String>> {
    outputs.iter().map(|o| parse_arequal_total(o)).collect()
}

/// Every brick of each subvolume has the same total
pub fn compare_subvols_arequal(executor: &dyn RemoteExecutor, subvols: &[Vec<String>]) -> bool {
    for subvol in subvols {
        let (ok, outputs) = collect_bricks_arequal(executor, subvol);
        if !ok {
            return false;
        }
        let totals = match totals(&outputs) {
            Some(t) => t,
            None => {
                error!("arequal output of {:?} has no total", subvol);
                return false;
            }
        };
        if totals.windows(2).any(|w| w[0] != w[1]) {
            error!("arequal differs across subvolume {:?}: {:?}", subvol, totals);
            return false;
        }
    }
    info!("arequal matches within all {} subvolumes", subvols.len());
    true
}

/// The mount's total equals the total of the first brick of each subvolume
pub fn compare_mount_and_bricks_arequal(
    executor: &dyn RemoteExecutor,
    mount: &Mount,
    subvols: &[Vec<String>],
) -> bool {
    let (ok, outputs) = collect_mounts_arequal(executor, std::slice::from_ref(mount), None);
    if !ok {
        return false;
    }
    let mount_total = match outputs.first().and_then(|o| parse_arequal_total(o)) {
        Some(t) => t,
        None => {
            error!("arequal of {}:{} has no total", mount.client, mount.mountpoint);
            return false;
        }
    };
    let firsts: Vec<String> = subvols.iter().filter_map(|s| s.first().cloned()).collect();
    let (ok, outputs) = collect_bricks_arequal(executor, &firsts);
    if !ok {
        return false;
    }
    for (brick, output) in firsts.iter().zip(outputs.iter()) {
        match parse_arequal_total(output) {
            Some(ref t) if *t == mount_total => {}
            other => {
                error!(
                    "arequal of {} is {:?}, mount has {}",
                    brick, other, mount_total
                );
                return false;
            }
        }
    }
    true
}
