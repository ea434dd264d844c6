//! Directory quota control and the `gluster volume quota <vol> list` parser.
use std::collections::BTreeMap;

use crate::executor::{CommandOutput, RemoteExecutor};
use crate::volume::get_volume_options;
use crate::{run_command, stdout_of, translate_to_bytes, GlusterError};

/// One row of `quota list`.  Sizes are in bytes; `None` where the CLI printed `N/A`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimit {
    pub path: String,
    pub hard_limit: u64,
    /// e.g. `80%`
    pub soft_limit_percent: String,
    pub soft_limit: Option<u64>,
    pub used: Option<u64>,
    pub available: Option<u64>,
    pub soft_limit_exceeded: bool,
    pub hard_limit_exceeded: bool,
}

fn yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

fn parse_row(line: &str) -> Option<QuotaLimit> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 || !fields[0].starts_with('/') {
        return None;
    }
    // Paths may contain spaces; the six value columns are always last
    let n = fields.len();
    let path = fields[..n - 6].join(" ");
    let soft = fields[n - 5];
    let (percent, soft_value) = match soft.find('(') {
        Some(idx) => (
            soft[..idx].to_string(),
            translate_to_bytes(soft[idx + 1..].trim_end_matches(')')),
        ),
        None => (soft.to_string(), None),
    };
    Some(QuotaLimit {
        path,
        hard_limit: translate_to_bytes(fields[n - 6])?,
        soft_limit_percent: percent,
        soft_limit: soft_value,
        used: translate_to_bytes(fields[n - 4]),
        available: translate_to_bytes(fields[n - 3]),
        soft_limit_exceeded: yes(fields[n - 2]),
        hard_limit_exceeded: yes(fields[n - 1]),
    })
}

/// Parse the table printed by `gluster volume quota <vol> list`, keyed by path
pub fn parse_quota_list(output: &str) -> Option<BTreeMap<String, QuotaLimit>> {
    let mut limits = BTreeMap::new();
    let mut seen_header = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') {
            continue;
        }
        if trimmed.starts_with("Path") {
            seen_header = true;
            continue;
        }
        match parse_row(trimmed) {
            Some(limit) => {
                limits.insert(limit.path.clone(), limit);
            }
            None => {
                if trimmed.starts_with('/') {
                    error!("Unable to parse quota list row {:?}", trimmed);
                    return None;
                }
                debug!("Skipping quota list line {:?}", trimmed);
            }
        }
    }
    if !seen_header && limits.is_empty() {
        return None;
    }
    Some(limits)
}

fn quota_command(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    args: &[&str],
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("quota".to_string());
    arg_list.push(volname.to_string());
    arg_list.extend(args.iter().map(|a| a.to_string()));
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn quota_enable(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    quota_command(executor, mnode, volname, &["enable"])
}

pub fn quota_disable(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    quota_command(executor, mnode, volname, &["disable"])
}

/// Limit `path` (relative to the volume root) to `limit`, e.g. `10GB`
pub fn quota_limit_usage(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    path: &str,
    limit: &str,
    soft_limit: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    match soft_limit {
        Some(soft) => quota_command(executor, mnode, volname, &["limit-usage", path, limit, soft]),
        None => quota_command(executor, mnode, volname, &["limit-usage", path, limit]),
    }
}

pub fn quota_remove(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    path: &str,
) -> Result<CommandOutput, GlusterError> {
    quota_command(executor, mnode, volname, &["remove", path])
}

pub fn quota_set_default_soft_limit(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    percent: &str,
) -> Result<CommandOutput, GlusterError> {
    quota_command(executor, mnode, volname, &["default-soft-limit", percent])
}

pub fn quota_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    path: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("quota".to_string());
    arg_list.push(volname.to_string());
    arg_list.push("list".to_string());
    if let Some(p) = path {
        arg_list.push(p.to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, false)
}

pub fn get_quota_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    path: Option<&str>,
) -> Option<BTreeMap<String, QuotaLimit>> {
    let out = stdout_of(
        quota_list(executor, mnode, volname, path),
        mnode,
        "gluster volume quota list",
    )?;
    parse_quota_list(&out)
}

pub fn is_quota_enabled(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    match get_volume_options(executor, mnode, volname, Some("features.quota")) {
        Some(options) => options.get("features.quota").map(|v| v == "on").unwrap_or(false),
        None => {
            error!("Unable to read features.quota of {}", volname);
            false
        }
    }
}
