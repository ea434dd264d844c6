//! Node level services: glusterd, firewall, local users and ssh keys.
use std::collections::BTreeMap;

use crate::executor::{all_succeeded, RemoteExecutor};
use crate::{run_and_check, shell_quote};

/// How glusterd looks on a set of nodes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GlusterdState {
    Running,
    /// The unit is inactive on at least one node
    Stopped,
    /// The unit is inactive but a glusterd process is still alive
    StalePid,
}

/// `systemctl <action> <service>` on every node at once
pub fn service_action(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    service: &str,
    action: &str,
) -> bool {
    let cmd = format!("systemctl {} {}", action, service);
    let results = executor.run_parallel(nodes, &cmd);
    let ok = all_succeeded(&cmd, &results);
    if ok {
        info!("{} {} on {:?}", action, service, nodes);
    }
    ok
}

pub fn start_glusterd(executor: &dyn RemoteExecutor, nodes: &[String]) -> bool {
    service_action(executor, nodes, "glusterd", "start")
}

pub fn stop_glusterd(executor: &dyn RemoteExecutor, nodes: &[String]) -> bool {
    service_action(executor, nodes, "glusterd", "stop")
}

pub fn restart_glusterd(executor: &dyn RemoteExecutor, nodes: &[String]) -> bool {
    service_action(executor, nodes, "glusterd", "restart")
}

/// Combined glusterd state of `nodes`.  A stale process outranks a plain stop.
pub fn is_glusterd_running(executor: &dyn RemoteExecutor, nodes: &[String]) -> GlusterdState {
    let active = executor.run_parallel(nodes, "systemctl is-active glusterd");
    let pids = executor.run_parallel(nodes, "pidof glusterd");
    let mut state = GlusterdState::Running;
    for node in nodes {
        let is_active = match active.get(node) {
            Some(Ok(output)) => output.success(),
            _ => false,
        };
        if is_active {
            continue;
        }
        let has_pid = match pids.get(node) {
            Some(Ok(output)) => output.success() && !output.stdout.trim().is_empty(),
            _ => false,
        };
        if has_pid {
            error!("glusterd is not active on {} but a process is still running", node);
            state = GlusterdState::StalePid;
        } else {
            error!("glusterd is not running on {}", node);
            if state == GlusterdState::Running {
                state = GlusterdState::Stopped;
            }
        }
    }
    state
}

fn firewall_args(flag: &str, values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("--{}={}", flag, shell_quote(v)))
        .collect::<Vec<String>>()
        .join(" ")
}

fn firewall_change(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    flag: &str,
    values: &[&str],
    permanent: bool,
) -> bool {
    let mut cmd = format!("firewall-cmd {}", firewall_args(flag, values));
    let results = executor.run_parallel(nodes, &cmd);
    if !all_succeeded(&cmd, &results) {
        return false;
    }
    if permanent {
        cmd.push_str(" --permanent");
        let results = executor.run_parallel(nodes, &cmd);
        if !all_succeeded(&cmd, &results) {
            return false;
        }
    }
    true
}

/// Open firewalld services such as `glusterfs`, `nfs` or `samba`
pub fn add_firewall_services(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    services: &[&str],
    permanent: bool,
) -> bool {
    firewall_change(executor, nodes, "add-service", services, permanent)
}

/// Open ports given as `port/proto`, e.g. `24007/tcp`
pub fn add_firewall_ports(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    ports: &[&str],
    permanent: bool,
) -> bool {
    firewall_change(executor, nodes, "add-port", ports, permanent)
}

pub fn add_user(executor: &dyn RemoteExecutor, node: &str, user: &str, group: Option<&str>) -> bool {
    let cmd = match group {
        Some(g) => format!("useradd -G {} {}", shell_quote(g), shell_quote(user)),
        None => format!("useradd {}", shell_quote(user)),
    };
    run_and_check(executor, node, &cmd)
}

pub fn del_user(executor: &dyn RemoteExecutor, node: &str, user: &str) -> bool {
    run_and_check(executor, node, &format!("userdel -r {}", shell_quote(user)))
}

pub fn group_add(executor: &dyn RemoteExecutor, node: &str, group: &str) -> bool {
    run_and_check(executor, node, &format!("groupadd {}", shell_quote(group)))
}

pub fn group_del(executor: &dyn RemoteExecutor, node: &str, group: &str) -> bool {
    run_and_check(executor, node, &format!("groupdel {}", shell_quote(group)))
}

pub fn set_passwd(executor: &dyn RemoteExecutor, node: &str, user: &str, password: &str) -> bool {
    let cmd = format!(
        "echo {} | chpasswd",
        shell_quote(&format!("{}:{}", user, password))
    );
    run_and_check(executor, node, &cmd)
}

/// Let `user` on `from_node` ssh into each of `to_nodes` without a password
pub fn setup_passwordless_ssh(
    executor: &dyn RemoteExecutor,
    from_node: &str,
    to_nodes: &[String],
    user: &str,
    password: &str,
) -> bool {
    let keygen = "test -f ~/.ssh/id_rsa.pub || ssh-keygen -q -t rsa -N '' -f ~/.ssh/id_rsa";
    match executor.run_as(from_node, keygen, Some(user)) {
        Ok(ref output) if output.success() => {}
        Ok(output) => {
            output.log_failure(from_node, keygen);
            return false;
        }
        Err(e) => {
            error!("Unable to create an ssh key on {}: {}", from_node, e);
            return false;
        }
    }
    for node in to_nodes {
        let copy = format!(
            "sshpass -p {} ssh-copy-id -o StrictHostKeyChecking=no -i ~/.ssh/id_rsa.pub {}@{}",
            shell_quote(password),
            shell_quote(user),
            node
        );
        match executor.run_as(from_node, &copy, Some(user)) {
            Ok(ref output) if output.success() => {
                info!("{}@{} can reach {} without a password", user, from_node, node)
            }
            Ok(output) => {
                output.log_failure(from_node, &format!("ssh-copy-id to {}", node));
                return false;
            }
            Err(e) => {
                error!("ssh-copy-id to {} could not be run on {}: {}", node, from_node, e);
                return false;
            }
        }
    }
    true
}

/// True when any node dumped a core since `since` (a `find -newermt` timestamp) or logged a
/// crash under `log_dir`.
pub fn is_core_file_created(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    since: &str,
    log_dir: &str,
) -> bool {
    let find_cores = format!(
        "find / -maxdepth 1 -name 'core*' -newermt {}",
        shell_quote(since)
    );
    let grep_crash = format!("grep -rl 'time of crash' {}", shell_quote(log_dir));
    let mut found: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (node, result) in executor.run_parallel(nodes, &find_cores) {
        if let Ok(output) = result {
            let cores: Vec<String> = output
                .stdout
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.to_string())
                .collect();
            if !cores.is_empty() {
                found.entry(node).or_insert_with(Vec::new).extend(cores);
            }
        }
    }
    for (node, result) in executor.run_parallel(nodes, &grep_crash) {
        // grep exits 1 when nothing matched
        if let Ok(output) = result {
            if output.success() && !output.stdout.trim().is_empty() {
                found
                    .entry(node)
                    .or_insert_with(Vec::new)
                    .extend(output.stdout.lines().map(|l| l.to_string()));
            }
        }
    }
    for (node, files) in &found {
        error!("Crash evidence on {}: {:?}", node, files);
    }
    !found.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::mock::MockExecutor;

    fn nodes() -> Vec<String> {
        vec!["srv1".to_string(), "srv2".to_string()]
    }

    #[test]
    fn test_glusterd_state() {
        let mock = MockExecutor::new();
        assert_eq!(is_glusterd_running(&mock, &nodes()), GlusterdState::Running);

        mock.on_node("srv2", "systemctl is-active glusterd", CommandOutput::fail(3, "inactive"));
        mock.on_node("srv2", "pidof glusterd", CommandOutput::fail(1, ""));
        assert_eq!(is_glusterd_running(&mock, &nodes()), GlusterdState::Stopped);

        let stale = MockExecutor::new();
        stale.on_node("srv1", "systemctl is-active glusterd", CommandOutput::fail(3, "inactive"));
        stale.on_node("srv1", "pidof glusterd", CommandOutput::ok("4242\n"));
        assert_eq!(is_glusterd_running(&stale, &nodes()), GlusterdState::StalePid);
    }

    #[test]
    fn test_firewall_permanent() {
        let mock = MockExecutor::new();
        assert!(add_firewall_services(&mock, &nodes(), &["glusterfs", "nfs"], true));
        assert_eq!(
            mock.count("firewall-cmd --add-service=glusterfs --add-service=nfs --permanent"),
            2
        );
        assert_eq!(mock.count("firewall-cmd --add-service=glusterfs --add-service=nfs"), 4);

        mock.on_node("srv2", "--add-port", CommandOutput::fail(1, "INVALID_PORT"));
        assert!(!add_firewall_ports(&mock, &nodes(), &["24007/tcp"], false));
    }

    #[test]
    fn test_core_file_probe() {
        let mock = MockExecutor::new();
        mock.on("grep -rl", CommandOutput::fail(1, ""));
        assert!(!is_core_file_created(&mock, &nodes(), "2026-01-01 10:00:00", "/var/log/glusterfs"));
        mock.on_node("srv2", "find /", CommandOutput::ok("/core.4242\n"));
        assert!(is_core_file_created(&mock, &nodes(), "2026-01-01 10:00:00", "/var/log/glusterfs"));
    }
}
