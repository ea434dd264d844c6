//! `gluster get-state`: the daemon's own dump of peers, volumes and services.
use std::collections::BTreeMap;

use regex::Regex;

use crate::executor::RemoteExecutor;
use crate::{run_command, shell_quote, stdout_of};

/// section -> key -> value, e.g. `state["Peers"]["Peer1.primary_hostname"]`
pub type GlusterState = BTreeMap<String, BTreeMap<String, String>>;

/// Parse a get-state dump.  Keys outside any `[Section]` header make the dump malformed.
pub fn parse_get_state(dump: &str) -> Option<GlusterState> {
    let mut state = GlusterState::new();
    let mut section: Option<String> = None;
    for (lineno, raw) in dump.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            state.entry(name.clone()).or_insert_with(BTreeMap::new);
            section = Some(name);
            continue;
        }
        let current = match section {
            Some(ref s) => s,
            None => {
                error!("get-state line {}: {:?} precedes any section", lineno + 1, line);
                return None;
            }
        };
        let (key, value) = match line.find(':') {
            Some(idx) => (line[..idx].trim(), line[idx + 1..].trim()),
            None => {
                debug!("get-state line {}: no key in {:?}", lineno + 1, line);
                continue;
            }
        };
        if let Some(entries) = state.get_mut(current) {
            entries.insert(key.to_string(), value.to_string());
        }
    }
    if state.is_empty() {
        return None;
    }
    Some(state)
}

/// Path of the dump file `gluster get-state` reports writing
pub fn parse_dump_path(output: &str) -> Option<String> {
    let re = match Regex::new(r"dumped to (\S+)") {
        Ok(r) => r,
        Err(e) => {
            error!("Bad get-state pattern: {}", e);
            return None;
        }
    };
    re.captures(output).map(|c| c[1].to_string())
}

/// Run get-state on `node`, read the dump and remove it
pub fn get_state(executor: &dyn RemoteExecutor, node: &str) -> Option<GlusterState> {
    let arg_list = vec!["get-state".to_string()];
    let out = stdout_of(
        run_command(executor, node, "gluster", &arg_list, false),
        node,
        "gluster get-state",
    )?;
    let path = match parse_dump_path(&out) {
        Some(p) => p,
        None => {
            error!("gluster get-state on {} did not name a dump file: {}", node, out.trim());
            return None;
        }
    };
    let cat = format!("cat {}", shell_quote(&path));
    let dump = stdout_of(executor.run(node, &cat), node, &cat);
    let rm = format!("rm -f {}", shell_quote(&path));
    if let Err(e) = executor.run(node, &rm) {
        warn!("Unable to remove {} on {}: {}", path, node, e);
    }
    parse_get_state(&dump?)
}
