//! Remote command execution.
//!
//! Everything the library does to a node goes through [`RemoteExecutor`].  The production
//! implementation shells out to `ssh`/`scp`; tests plug in [`crate::mock::MockExecutor`].
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use regex::{Captures, Regex};

use crate::GlusterError;

/// Exit status and captured streams of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    /// A zero exit with `stdout`
    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput::new(0, stdout, "")
    }

    pub fn fail(exit: i32, stderr: &str) -> CommandOutput {
        CommandOutput::new(exit, "", stderr)
    }

    pub fn success(&self) -> bool {
        self.exit == 0
    }

    /// Turn a non-zero exit into a `CommandError`
    pub fn checked(self, node: &str, command: &str) -> Result<CommandOutput, GlusterError> {
        if self.success() {
            Ok(self)
        } else {
            Err(GlusterError::CommandError {
                node: node.to_string(),
                command: command.to_string(),
                output: self,
            })
        }
    }

    pub(crate) fn log_failure(&self, node: &str, what: &str) {
        error!(
            "'{}' failed on {} with exit {}: stdout: {:?} stderr: {:?}",
            what,
            node,
            self.exit,
            self.stdout.trim(),
            self.stderr.trim()
        );
    }

    fn from_process(output: std::process::Output) -> CommandOutput {
        CommandOutput {
            // Killed by a signal
            exit: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

enum FutureState {
    Running(Child),
    Done(CommandOutput),
}

/// A command running in the background on a remote node.
///
/// The local end owns the ssh process.  [`RemoteFuture::wait`] blocks once; every later call
/// hands back the same output.
pub struct RemoteFuture {
    node: String,
    command: String,
    state: Option<FutureState>,
}

impl RemoteFuture {
    pub fn spawned(node: &str, command: &str, child: Child) -> RemoteFuture {
        RemoteFuture {
            node: node.to_string(),
            command: command.to_string(),
            state: Some(FutureState::Running(child)),
        }
    }

    /// A future that has already completed
    pub fn ready(node: &str, command: &str, output: CommandOutput) -> RemoteFuture {
        RemoteFuture {
            node: node.to_string(),
            command: command.to_string(),
            state: Some(FutureState::Done(output)),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check without blocking whether the remote command has exited.
    pub fn is_done(&mut self) -> bool {
        match self.state {
            Some(FutureState::Done(_)) => true,
            Some(FutureState::Running(ref mut child)) => match child.try_wait() {
                Ok(Some(_)) => true,
                Ok(None) => false,
                Err(_) => true,
            },
            None => true,
        }
    }

    /// Block until the command exits and return its output.
    pub fn wait(&mut self) -> Result<CommandOutput, GlusterError> {
        match self.state.take() {
            Some(FutureState::Done(output)) => {
                self.state = Some(FutureState::Done(output.clone()));
                Ok(output)
            }
            Some(FutureState::Running(child)) => {
                let output = match child.wait_with_output() {
                    Ok(o) => CommandOutput::from_process(o),
                    Err(e) => {
                        let err = GlusterError::TransportError {
                            node: self.node.clone(),
                            reason: e.to_string(),
                        };
                        self.state = Some(FutureState::Done(CommandOutput::fail(
                            -1,
                            &e.to_string(),
                        )));
                        return Err(err);
                    }
                };
                self.state = Some(FutureState::Done(output.clone()));
                Ok(output)
            }
            None => Err(GlusterError::new(format!(
                "background command '{}' on {} has no state",
                self.command, self.node
            ))),
        }
    }

    /// Kill the local ssh process and reap it.  Cancelling a finished future is a no-op.
    pub fn cancel(&mut self) -> Result<CommandOutput, GlusterError> {
        if let Some(FutureState::Running(ref mut child)) = self.state {
            if let Err(e) = child.kill() {
                // Already exited between our check and the kill
                debug!("kill of '{}' on {}: {}", self.command, self.node, e);
            }
        }
        self.wait()
    }
}

/// The one seam between the library and the nodes.
pub trait RemoteExecutor: Send + Sync {
    /// Run `cmd` on `node` as `user` (the executor's default user when `None`) and wait for it.
    /// A non-zero exit is returned in the output; only a failure to run at all is an `Err`.
    fn run_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<CommandOutput, GlusterError>;

    /// Start `cmd` on `node` and return without waiting.
    fn run_async_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<RemoteFuture, GlusterError>;

    /// Copy `local_path` into `remote_dir` on `node`, overwriting any previous copy.
    fn upload(&self, node: &str, local_path: &Path, remote_dir: &str)
        -> Result<(), GlusterError>;

    fn run(&self, node: &str, cmd: &str) -> Result<CommandOutput, GlusterError> {
        self.run_as(node, cmd, None)
    }

    fn run_async(&self, node: &str, cmd: &str) -> Result<RemoteFuture, GlusterError> {
        self.run_async_as(node, cmd, None)
    }

    /// Run `cmd` on every node at once and wait for all of them.  There is no ordering between
    /// nodes; the result is keyed by node.
    fn run_parallel(
        &self,
        nodes: &[String],
        cmd: &str,
    ) -> BTreeMap<String, Result<CommandOutput, GlusterError>> {
        let mut results = BTreeMap::new();
        let scoped = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = nodes
                .iter()
                .map(|node| (node.clone(), s.spawn(move |_| self.run(node, cmd))))
                .collect();
            for (node, handle) in handles {
                let result = match handle.join() {
                    Ok(r) => r,
                    Err(_) => Err(GlusterError::TransportError {
                        node: node.clone(),
                        reason: "runner thread panicked".to_string(),
                    }),
                };
                results.insert(node, result);
            }
        });
        if scoped.is_err() {
            error!("parallel run of '{}' did not complete on every node", cmd);
        }
        results
    }
}

/// True when every node ran the command and exited zero.  Failures are logged.
pub fn all_succeeded(
    cmd: &str,
    results: &BTreeMap<String, Result<CommandOutput, GlusterError>>,
) -> bool {
    let mut ok = true;
    for (node, result) in results {
        match result {
            Ok(output) if output.success() => {}
            Ok(output) => {
                output.log_failure(node, cmd);
                ok = false;
            }
            Err(e) => {
                error!("'{}' could not be run on {}: {}", cmd, node, e);
                ok = false;
            }
        }
    }
    ok
}

/// Runs commands through the local `ssh` binary.  Authentication is whatever the driver's
/// ssh configuration provides; batch mode keeps a missing key from hanging the test.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    user: String,
    ssh_options: Vec<String>,
}

impl SshExecutor {
    pub fn new(user: &str, ssh_options: &[String]) -> SshExecutor {
        SshExecutor {
            user: user.to_string(),
            ssh_options: ssh_options.to_vec(),
        }
    }

    fn ssh_command(&self, node: &str, cmd: &str, user: Option<&str>) -> Command {
        let mut command = Command::new("ssh");
        command.arg("-o").arg("BatchMode=yes");
        for opt in &self.ssh_options {
            command.arg("-o").arg(opt);
        }
        command.arg(format!("{}@{}", user.unwrap_or(&self.user), node));
        command.arg(cmd);
        command
    }
}

impl RemoteExecutor for SshExecutor {
    fn run_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<CommandOutput, GlusterError> {
        debug!("Running on {}: {}", node, cmd);
        let output = self
            .ssh_command(node, cmd, user)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GlusterError::TransportError {
                node: node.to_string(),
                reason: e.to_string(),
            })?;
        let output = CommandOutput::from_process(output);
        // ssh reserves 255 for its own failures
        if output.exit == 255 {
            warn!(
                "ssh to {} exited 255, the node may be unreachable: {}",
                node,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    fn run_async_as(
        &self,
        node: &str,
        cmd: &str,
        user: Option<&str>,
    ) -> Result<RemoteFuture, GlusterError> {
        debug!("Starting in the background on {}: {}", node, cmd);
        let child = self
            .ssh_command(node, cmd, user)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GlusterError::TransportError {
                node: node.to_string(),
                reason: e.to_string(),
            })?;
        Ok(RemoteFuture::spawned(node, cmd, child))
    }

    fn upload(
        &self,
        node: &str,
        local_path: &Path,
        remote_dir: &str,
    ) -> Result<(), GlusterError> {
        let mkdir = format!("mkdir -p {}", crate::shell_quote(remote_dir));
        self.run(node, &mkdir)?.checked(node, &mkdir)?;

        let mut command = Command::new("scp");
        command.arg("-o").arg("BatchMode=yes");
        for opt in &self.ssh_options {
            command.arg("-o").arg(opt);
        }
        command
            .arg(local_path)
            .arg(format!("{}@{}:{}/", self.user, node, remote_dir));
        debug!("Uploading {} to {}:{}", local_path.display(), node, remote_dir);
        let output = command.output().map_err(|e| GlusterError::TransportError {
            node: node.to_string(),
            reason: e.to_string(),
        })?;
        CommandOutput::from_process(output)
            .checked(node, &format!("scp {}", local_path.display()))?;
        Ok(())
    }
}

/// Materialise `template_path` into `output_path`, replacing every `{{ key }}` placeholder
/// with its value from `substitutions`.  A placeholder without a value is an error.
pub fn render_template(
    template_path: &Path,
    substitutions: &HashMap<String, String>,
    output_path: &Path,
) -> bool {
    let template = match fs::read_to_string(template_path) {
        Ok(t) => t,
        Err(e) => {
            error!("Unable to read template {}: {}", template_path.display(), e);
            return false;
        }
    };
    let placeholder = match Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}") {
        Ok(r) => r,
        Err(e) => {
            error!("Bad placeholder pattern: {}", e);
            return false;
        }
    };
    let mut missing: Vec<String> = Vec::new();
    let rendered = placeholder.replace_all(&template, |caps: &Captures| {
        match substitutions.get(&caps[1]) {
            Some(v) => v.clone(),
            None => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });
    if !missing.is_empty() {
        error!(
            "Template {} has no value for {:?}",
            template_path.display(),
            missing
        );
        return false;
    }
    if let Some(parent) = output_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            error!("Unable to create {}: {}", parent.display(), e);
            return false;
        }
    }
    match fs::write(output_path, rendered.as_bytes()) {
        Ok(_) => {
            info!("Rendered {} to {}", template_path.display(), output_path.display());
            true
        }
        Err(e) => {
            error!("Unable to write {}: {}", output_path.display(), e);
            false
        }
    }
}
