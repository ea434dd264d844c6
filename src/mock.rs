//! A scripted [`RemoteExecutor`] for exercising the library without a cluster.
//!
//! Responses are registered against a fragment of the command line (and optionally a node).
//! When several rules match, the one with the longest fragment wins; on a tie a rule for the
//! node beats one for any node, then the rule registered first wins.  Registering the same
//! rule again queues another response; the last one queued keeps being returned.  Commands
//! nothing matches succeed with empty output.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::executor::{CommandOutput, RemoteExecutor, RemoteFuture};
use crate::GlusterError;

struct Rule {
    node: Option<String>,
    fragment: String,
    responses: VecDeque<CommandOutput>,
}

impl Rule {
    fn matches(&self, node: &str, cmd: &str) -> bool {
        if let Some(ref n) = self.node {
            if n != node {
                return false;
            }
        }
        cmd.contains(&self.fragment)
    }
}

// A poisoned lock still hands out its data
fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One command the mock was asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub node: String,
    pub command: String,
    pub user: Option<String>,
    pub background: bool,
}

#[derive(Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<Rule>>,
    issued: Mutex<Vec<Issued>>,
    uploads: Mutex<Vec<(String, PathBuf, String)>>,
    unreachable: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> MockExecutor {
        MockExecutor::default()
    }

    /// Respond with `output` to any command on any node containing `fragment`.
    pub fn on(&self, fragment: &str, output: CommandOutput) -> &MockExecutor {
        self.push_rule(None, fragment, output);
        self
    }

    /// Respond with `output` to commands on `node` containing `fragment`.
    pub fn on_node(&self, node: &str, fragment: &str, output: CommandOutput) -> &MockExecutor {
        self.push_rule(Some(node.to_string()), fragment, output);
        self
    }

    /// Every command sent to `node` fails at the transport level from now on.
    pub fn make_unreachable(&self, node: &str) {
        locked(&self.unreachable).push(node.to_string());
    }

    fn push_rule(&self, node: Option<String>, fragment: &str, output: CommandOutput) {
        let mut rules = locked(&self.rules);
        for rule in rules.iter_mut() {
            if rule.node == node && rule.fragment == fragment {
                rule.responses.push_back(output);
                return;
            }
        }
        let mut responses = VecDeque::new();
        responses.push_back(output);
        rules.push(Rule {
            node,
            fragment: fragment.to_string(),
            responses,
        });
    }

    fn respond(&self, node: &str, cmd: &str) -> CommandOutput {
        let mut rules = locked(&self.rules);
        let mut best: Option<usize> = None;
        for (idx, rule) in rules.iter().enumerate() {
            if !rule.matches(node, cmd) {
                continue;
            }
            let rank = (rule.fragment.len(), rule.node.is_some());
            best = match best {
                Some(b) if (rules[b].fragment.len(), rules[b].node.is_some()) >= rank => Some(b),
                _ => Some(idx),
            };
        }
        match best {
            Some(idx) => {
                let responses = &mut rules[idx].responses;
                if responses.len() > 1 {
                    responses.pop_front().unwrap_or_default()
                } else {
                    responses.front().cloned().unwrap_or_default()
                }
            }
            None => CommandOutput::ok(""),
        }
    }

    fn record(&self, node: &str, cmd: &str, user: Option<&str>, background: bool) {
        locked(&self.issued).push(Issued {
            node: node.to_string(),
            command: cmd.to_string(),
            user: user.map(|u| u.to_string()),
            background,
        });
    }

    fn check_reachable(&self, node: &str) -> Result<(), GlusterError> {
        if locked(&self.unreachable).iter().any(|n| n == node) {
            return Err(GlusterError::TransportError {
                node: node.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    /// Everything issued so far, in order
    pub fn issued(&self) -> Vec<Issued> {
        locked(&self.issued).clone()
    }

    /// Command lines issued so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.issued().into_iter().map(|i| i.command).collect()
    }

    pub fn commands_on(&self, node: &str) -> Vec<String> {
        self.issued()
            .into_iter()
            .filter(|i| i.node == node)
            .map(|i| i.command)
            .collect()
    }

    /// How many issued commands contain `fragment`
    pub fn count(&self, fragment: &str) -> usize {
        self.issued()
            .iter()
            .filter(|i| i.command.contains(fragment))
            .count()
    }

    pub fn uploads(&self) -> Vec<(String, PathBuf, String)> {
        locked(&self.uploads).clone()
    }
}

impl RemoteExecutor for MockExecutor {
    fn run_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<CommandOutput, GlusterError> {
        self.record(node, cmd, user, false);
        self.check_reachable(node)?;
        Ok(self.respond(node, cmd))
    }

    fn run_async_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<RemoteFuture, GlusterError> {
        self.record(node, cmd, user, true);
        self.check_reachable(node)?;
        Ok(RemoteFuture::ready(node, cmd, self.respond(node, cmd)))
    }

    fn upload(
        &self,
        node: &str,
        local_path: &Path,
        remote_dir: &str,
    ) -> Result<(), GlusterError> {
        self.check_reachable(node)?;
        locked(&self.uploads).push((
            node.to_string(),
            local_path.to_path_buf(),
            remote_dir.to_string(),
        ));
        Ok(())
    }
}
