//! CPU and memory sampling of gluster processes, and the analyses run over the samples.
//!
//! A sampler script, uploaded with the other helper scripts, runs in the background on each
//! node for one process class and appends `test_name,pid,cpu_percent,memory_mb` rows to
//! [`ClusterPaths::sampler_csv`].  Once the samplers stop, the csv files are read back and
//! summarised, or checked for leaks, cpu spikes and OOM kills.
use std::collections::{BTreeMap, BTreeSet};

use crate::executor::{RemoteExecutor, RemoteFuture};
use crate::paths::ClusterPaths;
use crate::volume::{get_volume_status, VolumeStatus};
use crate::{shell_quote, stdout_of, GlusterError};

pub const SAMPLER_SCRIPT: &str = "memory_and_cpu_usage.py";
pub const SERVER_PROCESSES: [&str; 3] = ["glusterd", "glusterfs", "glusterfsd"];
pub const CLIENT_PROCESSES: [&str; 1] = ["glusterfs"];
/// Memory growth in MB the leak detector tolerates between samples
pub const DEFAULT_LEAK_GAIN_MB: f64 = 30.0;
/// Samples pinned at 100% cpu tolerated before a process counts as spiking
pub const DEFAULT_SPIKE_THRESHOLD: usize = 3;

/// One background sampler
pub struct Sampler {
    pub node: String,
    pub process: String,
    pub future: RemoteFuture,
}

/// Samplers started on both sides of the cluster
#[derive(Default)]
pub struct ClusterSamplers {
    pub servers: Vec<Sampler>,
    pub clients: Vec<Sampler>,
}

impl ClusterSamplers {
    pub fn wait(&mut self) -> bool {
        let servers = wait_for_logging_processes_to_stop(&mut self.servers);
        let clients = wait_for_logging_processes_to_stop(&mut self.clients);
        servers && clients
    }

    pub fn kill(&mut self, executor: &dyn RemoteExecutor) -> bool {
        let servers = kill_all_logging_processes(executor, &mut self.servers);
        let clients = kill_all_logging_processes(executor, &mut self.clients);
        servers && clients
    }
}

pub fn sampler_command(paths: &ClusterPaths, process: &str, test_name: &str, interval: u64, count: u64) -> String {
    format!(
        "python3 {} -p {} -i {} -c {} -t {} -o {}",
        shell_quote(&paths.script(SAMPLER_SCRIPT)),
        shell_quote(process),
        interval,
        count,
        shell_quote(test_name),
        shell_quote(&paths.sampler_csv(process))
    )
}

fn start_samplers(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    processes: &[&str],
    paths: &ClusterPaths,
    test_name: &str,
    interval: u64,
    count: u64,
) -> Result<Vec<Sampler>, GlusterError> {
    let mut samplers = Vec::new();
    for node in nodes {
        for process in processes {
            let cmd = sampler_command(paths, process, test_name, interval, count);
            match executor.run_async(node, &cmd) {
                Ok(future) => samplers.push(Sampler {
                    node: node.clone(),
                    process: process.to_string(),
                    future,
                }),
                Err(e) => {
                    error!("Unable to start the {} sampler on {}: {}", process, node, e);
                    kill_all_logging_processes(executor, &mut samplers);
                    return Err(e);
                }
            }
        }
    }
    info!(
        "Sampling {:?} on {:?} every {}s, {} samples, for {}",
        processes, nodes, interval, count, test_name
    );
    Ok(samplers)
}

/// Sample glusterd, glusterfs and glusterfsd on every server
pub fn log_memory_and_cpu_usage_on_servers(
    executor: &dyn RemoteExecutor,
    servers: &[String],
    paths: &ClusterPaths,
    test_name: &str,
    interval: u64,
    count: u64,
) -> Result<Vec<Sampler>, GlusterError> {
    start_samplers(executor, servers, &SERVER_PROCESSES, paths, test_name, interval, count)
}

/// Sample the fuse client process on every client
pub fn log_memory_and_cpu_usage_on_clients(
    executor: &dyn RemoteExecutor,
    clients: &[String],
    paths: &ClusterPaths,
    test_name: &str,
    interval: u64,
    count: u64,
) -> Result<Vec<Sampler>, GlusterError> {
    start_samplers(executor, clients, &CLIENT_PROCESSES, paths, test_name, interval, count)
}

pub fn log_memory_and_cpu_usage_on_cluster(
    executor: &dyn RemoteExecutor,
    servers: &[String],
    clients: &[String],
    paths: &ClusterPaths,
    test_name: &str,
    interval: u64,
    count: u64,
) -> Result<ClusterSamplers, GlusterError> {
    let mut samplers = ClusterSamplers::default();
    samplers.servers = log_memory_and_cpu_usage_on_servers(executor, servers, paths, test_name, interval, count)?;
    match log_memory_and_cpu_usage_on_clients(executor, clients, paths, test_name, interval, count) {
        Ok(c) => samplers.clients = c,
        Err(e) => {
            samplers.kill(executor);
            return Err(e);
        }
    }
    Ok(samplers)
}

/// Join every sampler.  True when all of them ran to completion and exited zero.
pub fn wait_for_logging_processes_to_stop(samplers: &mut [Sampler]) -> bool {
    let mut ok = true;
    for sampler in samplers.iter_mut() {
        match sampler.future.wait() {
            Ok(ref output) if output.success() => {}
            Ok(output) => {
                output.log_failure(&sampler.node, &format!("{} sampler", sampler.process));
                ok = false;
            }
            Err(e) => {
                error!("{} sampler on {} failed: {}", sampler.process, sampler.node, e);
                ok = false;
            }
        }
    }
    ok
}

/// Kill the sampler script on every node it runs on and reap the local ends
pub fn kill_all_logging_processes(executor: &dyn RemoteExecutor, samplers: &mut [Sampler]) -> bool {
    let nodes: Vec<String> = samplers
        .iter()
        .map(|s| s.node.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    let cmd = format!("pkill -f {}", shell_quote(SAMPLER_SCRIPT));
    let mut ok = true;
    for (node, result) in executor.run_parallel(&nodes, &cmd) {
        match result {
            // pkill exits 1 when the samplers already finished
            Ok(ref output) if output.exit == 0 || output.exit == 1 => {}
            Ok(output) => {
                output.log_failure(&node, &cmd);
                ok = false;
            }
            Err(e) => {
                error!("'{}' could not be run on {}: {}", cmd, node, e);
                ok = false;
            }
        }
    }
    for sampler in samplers.iter_mut() {
        if let Err(e) = sampler.future.cancel() {
            warn!("Reaping the {} sampler of {} failed: {}", sampler.process, sampler.node, e);
        }
    }
    ok
}

/// One csv row
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub test_name: String,
    pub pid: u32,
    pub cpu: f64,
    pub mem: f64,
}

/// Parse sampler csv.  Headers and malformed rows are skipped.
pub fn parse_sampler_csv(text: &str) -> Vec<Sample> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
            if fields.len() != 4 {
                return None;
            }
            let sample = Sample {
                test_name: fields[0].to_string(),
                pid: fields[1].parse().ok()?,
                cpu: fields[2].parse().ok()?,
                mem: fields[3].parse().ok()?,
            };
            Some(sample)
        })
        .collect()
}

/// Samples of `process` recorded for `test_name` on `node`
pub fn read_samples(
    executor: &dyn RemoteExecutor,
    node: &str,
    paths: &ClusterPaths,
    process: &str,
    test_name: &str,
) -> Option<Vec<Sample>> {
    let cmd = format!("cat {}", shell_quote(&paths.sampler_csv(process)));
    let text = stdout_of(executor.run(node, &cmd), node, &cmd)?;
    let samples: Vec<Sample> = parse_sampler_csv(&text)
        .into_iter()
        .filter(|s| s.test_name == test_name)
        .collect();
    if samples.is_empty() {
        error!("No {} samples for {} on {}", process, test_name, node);
        return None;
    }
    Some(samples)
}

/// Samples split per pid, each series in recorded order
pub fn by_pid(samples: &[Sample]) -> BTreeMap<u32, Vec<Sample>> {
    let mut series: BTreeMap<u32, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        series.entry(sample.pid).or_insert_with(Vec::new).push(sample.clone());
    }
    series
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Stats {
    pub fn of(values: &[f64]) -> Option<Stats> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        Some(Stats {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        })
    }
}

/// Cpu and memory summary of a set of samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStats {
    pub cpu: Stats,
    pub mem: Stats,
}

impl UsageStats {
    pub fn of(samples: &[Sample]) -> Option<UsageStats> {
        let cpu: Vec<f64> = samples.iter().map(|s| s.cpu).collect();
        let mem: Vec<f64> = samples.iter().map(|s| s.mem).collect();
        Some(UsageStats {
            cpu: Stats::of(&cpu)?,
            mem: Stats::of(&mem)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessUsage {
    /// One daemon per node.  A pid change during the window means it restarted.
    Daemon { usage: UsageStats, is_restarted: bool },
    /// volume -> brick path or daemon name -> usage
    ByEndpoint(BTreeMap<String, BTreeMap<String, UsageStats>>),
    /// Processes no volume status entry accounts for, by pid
    ByPid(BTreeMap<u32, UsageStats>),
}

/// node -> process class -> usage
pub type UsageReport = BTreeMap<String, BTreeMap<String, ProcessUsage>>;

/// pid -> (volume, brick path or daemon name) for the processes `volume status` lists on
/// `node`
pub fn pid_owners(status: &VolumeStatus, node: &str) -> BTreeMap<u32, (String, String)> {
    let mut owners = BTreeMap::new();
    for (volname, nodes) in status {
        if let Some(endpoints) = nodes.get(node) {
            for (endpoint, ep) in endpoints {
                if let Ok(pid) = ep.pid.trim().parse::<u32>() {
                    owners.insert(pid, (volname.clone(), endpoint.clone()));
                }
            }
        }
    }
    owners
}

/// Summarise samples per owner.  Without any owner the samples are summarised per pid.
pub fn usage_by_endpoint(samples: &[Sample], owners: &BTreeMap<u32, (String, String)>) -> ProcessUsage {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<Sample>>> = BTreeMap::new();
    let mut unowned: Vec<Sample> = Vec::new();
    for sample in samples {
        match owners.get(&sample.pid) {
            Some((vol, endpoint)) => grouped
                .entry(vol.clone())
                .or_insert_with(BTreeMap::new)
                .entry(endpoint.clone())
                .or_insert_with(Vec::new)
                .push(sample.clone()),
            None => unowned.push(sample.clone()),
        }
    }
    if grouped.is_empty() {
        return usage_by_pid(&unowned);
    }
    if !unowned.is_empty() {
        debug!("{} samples belong to no volume endpoint", unowned.len());
    }
    ProcessUsage::ByEndpoint(
        grouped
            .into_iter()
            .map(|(vol, endpoints)| {
                let stats = endpoints
                    .into_iter()
                    .filter_map(|(ep, s)| UsageStats::of(&s).map(|u| (ep, u)))
                    .collect();
                (vol, stats)
            })
            .collect(),
    )
}

pub fn usage_by_pid(samples: &[Sample]) -> ProcessUsage {
    ProcessUsage::ByPid(
        by_pid(samples)
            .into_iter()
            .filter_map(|(pid, s)| UsageStats::of(&s).map(|u| (pid, u)))
            .collect(),
    )
}

pub fn daemon_usage(samples: &[Sample]) -> Option<ProcessUsage> {
    Some(ProcessUsage::Daemon {
        usage: UsageStats::of(samples)?,
        is_restarted: by_pid(samples).len() > 1,
    })
}

/// Summaries of every server process class, bricks and daemons attributed through
/// `volume status` on `mnode`
pub fn compute_data_usage_stats_on_servers(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    servers: &[String],
    paths: &ClusterPaths,
    test_name: &str,
) -> Option<UsageReport> {
    let status = get_volume_status(executor, mnode, None, None).unwrap_or_else(|| {
        warn!("No volume status from {}, usage is reported per pid", mnode);
        VolumeStatus::new()
    });
    let mut report = UsageReport::new();
    for server in servers {
        let owners = pid_owners(&status, server);
        let mut processes = BTreeMap::new();
        for process in SERVER_PROCESSES.iter() {
            let samples = match read_samples(executor, server, paths, process, test_name) {
                Some(samples) => samples,
                None => {
                    warn!("Skipping {} usage on {}", process, server);
                    continue;
                }
            };
            let usage = if *process == "glusterd" {
                match daemon_usage(&samples) {
                    Some(usage) => usage,
                    None => {
                        warn!("Skipping glusterd usage on {}", server);
                        continue;
                    }
                }
            } else {
                usage_by_endpoint(&samples, &owners)
            };
            processes.insert(process.to_string(), usage);
        }
        report.insert(server.clone(), processes);
    }
    non_empty(report)
}

pub fn compute_data_usage_stats_on_clients(
    executor: &dyn RemoteExecutor,
    clients: &[String],
    paths: &ClusterPaths,
    test_name: &str,
) -> Option<UsageReport> {
    let mut report = UsageReport::new();
    for client in clients {
        let mut processes = BTreeMap::new();
        for process in CLIENT_PROCESSES.iter() {
            match read_samples(executor, client, paths, process, test_name) {
                Some(samples) => {
                    processes.insert(process.to_string(), usage_by_pid(&samples));
                }
                None => warn!("Skipping {} usage on {}", process, client),
            }
        }
        report.insert(client.clone(), processes);
    }
    non_empty(report)
}

// A node missing one csv keeps the rest of the report; no samples anywhere is a failure
fn non_empty(report: UsageReport) -> Option<UsageReport> {
    if report.values().all(|processes| processes.is_empty()) {
        error!("No usage samples on any node");
        return None;
    }
    Some(report)
}

/// Differences between consecutive values
pub fn deltas(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// A delta above `gain` followed by two larger deltas, with the final delta larger as well.
/// Isolated jumps do not count.
pub fn is_leak_pattern(mem: &[f64], gain: f64) -> bool {
    let d = deltas(mem);
    let last = match d.last() {
        Some(l) => *l,
        None => return false,
    };
    (0..d.len()).any(|i| {
        d[i] > gain
            && d.get(i + 1).map_or(false, |n| *n > d[i])
            && d.get(i + 2).map_or(false, |n| *n > d[i])
            && last > d[i]
    })
}

/// Resident memory of `pid` on `node` right now, in MB
pub fn live_memory_mb(executor: &dyn RemoteExecutor, node: &str, pid: u32) -> Option<f64> {
    let cmd = format!("ps -o rss= -p {}", pid);
    let out = stdout_of(executor.run(node, &cmd), node, &cmd)?;
    let kb: f64 = out.trim().parse().ok()?;
    Some(kb / 1024.0)
}

/// Check every pid of `process` sampled on `nodes` for a leak.  True when one leaks.
pub fn check_for_memory_leaks(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    paths: &ClusterPaths,
    process: &str,
    test_name: &str,
    gain: f64,
) -> bool {
    let mut leaking = false;
    for node in nodes {
        let samples = match read_samples(executor, node, paths, process, test_name) {
            Some(s) => s,
            None => continue,
        };
        for (pid, series) in by_pid(&samples) {
            let mem: Vec<f64> = series.iter().map(|s| s.mem).collect();
            if is_leak_pattern(&mem, gain) {
                error!("{} pid {} on {} leaks memory: {:?}", process, pid, node, mem);
                leaking = true;
                continue;
            }
            let last = match mem.last() {
                Some(l) => *l,
                None => continue,
            };
            if let Some(now) = live_memory_mb(executor, node, pid) {
                if now - last > gain {
                    error!(
                        "{} pid {} on {} grew from {:.1}MB to {:.1}MB after sampling",
                        process, pid, node, last, now
                    );
                    leaking = true;
                }
            }
        }
    }
    leaking
}

pub fn check_for_memory_leaks_in_glusterd(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, gain: f64) -> bool {
    check_for_memory_leaks(executor, nodes, paths, "glusterd", test_name, gain)
}

pub fn check_for_memory_leaks_in_glusterfs(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, gain: f64) -> bool {
    check_for_memory_leaks(executor, nodes, paths, "glusterfs", test_name, gain)
}

pub fn check_for_memory_leaks_in_glusterfsd(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, gain: f64) -> bool {
    check_for_memory_leaks(executor, nodes, paths, "glusterfsd", test_name, gain)
}

/// Samples at or above 100% cpu
pub fn spike_count(samples: &[Sample]) -> usize {
    samples.iter().filter(|s| s.cpu >= 100.0).count()
}

/// True when some pid of `process` on `nodes` sat at 100% cpu more than `threshold` times
pub fn check_for_cpu_usage_spikes(
    executor: &dyn RemoteExecutor,
    nodes: &[String],
    paths: &ClusterPaths,
    process: &str,
    test_name: &str,
    threshold: usize,
) -> bool {
    let mut spiking = false;
    for node in nodes {
        let samples = match read_samples(executor, node, paths, process, test_name) {
            Some(s) => s,
            None => continue,
        };
        for (pid, series) in by_pid(&samples) {
            let spikes = spike_count(&series);
            if spikes > threshold {
                error!(
                    "{} pid {} on {} hit 100% cpu {} times (threshold {})",
                    process, pid, node, spikes, threshold
                );
                spiking = true;
            }
        }
    }
    spiking
}

pub fn check_for_cpu_usage_spikes_on_glusterd(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, threshold: usize) -> bool {
    check_for_cpu_usage_spikes(executor, nodes, paths, "glusterd", test_name, threshold)
}

pub fn check_for_cpu_usage_spikes_on_glusterfs(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, threshold: usize) -> bool {
    check_for_cpu_usage_spikes(executor, nodes, paths, "glusterfs", test_name, threshold)
}

pub fn check_for_cpu_usage_spikes_on_glusterfsd(executor: &dyn RemoteExecutor, nodes: &[String], paths: &ClusterPaths, test_name: &str, threshold: usize) -> bool {
    check_for_cpu_usage_spikes(executor, nodes, paths, "glusterfsd", test_name, threshold)
}

/// Kernel OOM kills of `process` in `/var/log/messages*`
pub fn parse_oom_kills(messages: &str, process: &str) -> Vec<String> {
    let marker = format!("({})", process);
    messages
        .lines()
        .filter(|l| l.to_lowercase().contains("killed process") && l.contains(&marker))
        .map(|l| l.trim().to_string())
        .collect()
}

/// True when the kernel OOM killer took out `process` on any of `nodes`
pub fn check_for_oom_killers(executor: &dyn RemoteExecutor, nodes: &[String], process: &str) -> bool {
    let cmd = "grep -i 'killed process' /var/log/messages*";
    let mut killed = false;
    for (node, result) in executor.run_parallel(nodes, cmd) {
        match result {
            // grep exits 1 when nothing matched
            Ok(ref output) if output.exit == 0 || output.exit == 1 => {
                for line in parse_oom_kills(&output.stdout, process) {
                    error!("OOM kill of {} on {}: {}", process, node, line);
                    killed = true;
                }
            }
            Ok(output) => output.log_failure(&node, cmd),
            Err(e) => error!("'{}' could not be run on {}: {}", cmd, node, e),
        }
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::mock::MockExecutor;
    use crate::volume::{EndpointMap, EndpointStatus, NodeMap};

    const CSV: &str = "test_name,pid,cpu,mem
test_io,2211,1.5,100.0
test_io,2211,100.0,110.0
other,9,1.0,1.0
test_io,2211,2.5,120.0
test_io,2300,100.0,90.0
garbage line
";

    fn nodes() -> Vec<String> {
        vec!["srv1".to_string()]
    }

    #[test]
    fn test_parse_csv() {
        let samples = parse_sampler_csv(CSV);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[1].pid, 2211);
        assert_eq!(samples[1].cpu, 100.0);
        assert_eq!(by_pid(&samples)[&2211].len(), 3);
    }

    #[test]
    fn test_stats() {
        let s = Stats::of(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.median, 2.5);
        assert_eq!(Stats::of(&[5.0, 1.0, 3.0]).unwrap().median, 3.0);
        assert!(Stats::of(&[]).is_none());
    }

    #[test]
    fn test_leak_rule() {
        // deltas 40, 50, 60, 70
        assert!(is_leak_pattern(&[100.0, 140.0, 190.0, 250.0, 320.0], 30.0));
        // deltas 40, 50, 60: the final delta is the +2 delta
        assert!(is_leak_pattern(&[100.0, 140.0, 190.0, 250.0], 30.0));
        // one jump, then flat
        assert!(!is_leak_pattern(&[100.0, 140.0, 141.0, 142.0, 143.0], 30.0));
        // rising, but the last delta falls back
        assert!(!is_leak_pattern(&[100.0, 140.0, 190.0, 250.0, 255.0], 30.0));
        // the jump is too close to the end to be confirmed
        assert!(!is_leak_pattern(&[100.0, 101.0, 102.0, 150.0, 210.0], 30.0));
        assert!(!is_leak_pattern(&[100.0], 30.0));
    }

    #[test]
    fn test_leak_check_reads_sampler_csv() {
        let mock = MockExecutor::new();
        mock.on("cat /root/glusterd.csv", CommandOutput::ok("t,10,1.0,100.0\nt,10,1.0,101.0\n"));
        mock.on("ps -o rss= -p 10", CommandOutput::ok("104448\n"));
        // 102MB now, within the gain
        assert!(!check_for_memory_leaks_in_glusterd(&mock, &nodes(), &ClusterPaths::default(), "t", 30.0));

        let grown = MockExecutor::new();
        grown.on("cat /root/glusterd.csv", CommandOutput::ok("t,10,1.0,100.0\nt,10,1.0,101.0\n"));
        // 200MB now
        grown.on("ps -o rss= -p 10", CommandOutput::ok("204800\n"));
        assert!(check_for_memory_leaks_in_glusterd(&grown, &nodes(), &ClusterPaths::default(), "t", 30.0));
    }

    #[test]
    fn test_spikes() {
        let mock = MockExecutor::new();
        mock.on("cat /root/glusterfsd.csv", CommandOutput::ok(CSV));
        let paths = ClusterPaths::default();
        assert!(!check_for_cpu_usage_spikes_on_glusterfsd(&mock, &nodes(), &paths, "test_io", 1));
        assert!(check_for_cpu_usage_spikes_on_glusterfsd(&mock, &nodes(), &paths, "test_io", 0));
    }

    #[test]
    fn test_usage_attribution() {
        let samples = parse_sampler_csv(CSV);
        let mut endpoints = EndpointMap::new();
        endpoints.insert(
            "/bricks/brick0/v1_brick0".to_string(),
            EndpointStatus {
                pid: "2211".to_string(),
                status: "1".to_string(),
                ..Default::default()
            },
        );
        let mut nodes_map = NodeMap::new();
        nodes_map.insert("srv1".to_string(), endpoints);
        let mut status = VolumeStatus::new();
        status.insert("v1".to_string(), nodes_map);

        let owners = pid_owners(&status, "srv1");
        assert_eq!(owners[&2211], ("v1".to_string(), "/bricks/brick0/v1_brick0".to_string()));
        assert!(pid_owners(&status, "srv2").is_empty());

        let test_io: Vec<Sample> = samples.into_iter().filter(|s| s.test_name == "test_io").collect();
        match usage_by_endpoint(&test_io, &owners) {
            ProcessUsage::ByEndpoint(map) => {
                let usage = map["v1"]["/bricks/brick0/v1_brick0"];
                assert_eq!(usage.mem.max, 120.0);
                assert_eq!(usage.mem.median, 110.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        match daemon_usage(&test_io).unwrap() {
            ProcessUsage::Daemon { is_restarted, .. } => assert!(is_restarted),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_usage_skips_missing_csv() {
        let mock = MockExecutor::new();
        mock.on("cat /root/glusterd.csv", CommandOutput::ok("test_io,10,1.0,100.0\ntest_io,10,1.0,101.0\n"));
        mock.on("cat /root/glusterfs.csv", CommandOutput::ok("test_io,30,1.0,50.0\n"));
        mock.on("cat /root/glusterfsd.csv", CommandOutput::ok(CSV));
        mock.on_node(
            "srv2",
            "cat /root/glusterfsd.csv",
            CommandOutput::fail(1, "cat: /root/glusterfsd.csv: No such file or directory"),
        );
        let servers = vec!["srv1".to_string(), "srv2".to_string()];

        let report =
            compute_data_usage_stats_on_servers(&mock, "srv1", &servers, &ClusterPaths::default(), "test_io")
                .unwrap();
        assert_eq!(report.len(), 2);
        assert!(report["srv1"].contains_key("glusterfsd"));
        assert!(!report["srv2"].contains_key("glusterfsd"));
        assert!(report["srv2"].contains_key("glusterd"));
        assert!(report["srv2"].contains_key("glusterfs"));

        let nothing = MockExecutor::new();
        nothing.on("cat /root/", CommandOutput::fail(1, "No such file or directory"));
        assert!(compute_data_usage_stats_on_clients(&nothing, &servers, &ClusterPaths::default(), "test_io").is_none());
    }

    #[test]
    fn test_samplers_start_and_stop() {
        let mock = MockExecutor::new();
        let paths = ClusterPaths::default();
        let servers = vec!["srv1".to_string(), "srv2".to_string()];
        let clients = vec!["cli1".to_string()];
        let mut samplers =
            log_memory_and_cpu_usage_on_cluster(&mock, &servers, &clients, &paths, "test_io", 60, 10).unwrap();
        assert_eq!(samplers.servers.len(), 6);
        assert_eq!(samplers.clients.len(), 1);
        let issued = mock.issued();
        assert!(issued.iter().all(|i| i.background));
        assert_eq!(
            issued[0].command,
            "python3 /usr/share/glustolibs/io/scripts/memory_and_cpu_usage.py -p glusterd -i 60 -c 10 -t test_io -o /root/glusterd.csv"
        );
        assert!(samplers.wait());
        assert!(samplers.kill(&mock));
        assert_eq!(mock.count("pkill -f memory_and_cpu_usage.py"), 3);
    }

    #[test]
    fn test_oom() {
        let mock = MockExecutor::new();
        mock.on(
            "killed process",
            CommandOutput::ok("/var/log/messages:Jun 21 kernel: Out of memory: Killed process 2211 (glusterfsd) total-vm:1234kB\n"),
        );
        assert!(check_for_oom_killers(&mock, &nodes(), "glusterfsd"));
        assert!(!check_for_oom_killers(&mock, &nodes(), "glusterd"));
        let quiet = MockExecutor::new();
        quiet.on("killed process", CommandOutput::fail(1, ""));
        assert!(!check_for_oom_killers(&quiet, &nodes(), "glusterfsd"));
    }
}
