//! Local process execution.

use async_trait::async_trait;
use isaac_common::{ShellError, ShellExecutionAdapter, ShellOutput};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How to hand a command string to the shell binary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<&'static str>,
}

impl Invocation {
    fn for_shell(name: &str) -> Self {
        let (program, args): (&str, Vec<&'static str>) = match name.to_lowercase().as_str() {
            "powershell" => ("powershell", vec!["-NoProfile", "-NonInteractive", "-Command"]),
            "pwsh" => ("pwsh", vec!["-NoProfile", "-NonInteractive", "-Command"]),
            "cmd" => ("cmd", vec!["/C"]),
            _ => (name, vec!["-c"]),
        };
        Self {
            program: program.to_string(),
            args,
        }
    }
}

/// Runs commands through a real shell, tracking `cd` across calls.
pub struct ProcessShell {
    name: String,
    invocation: Invocation,
    cwd: Mutex<PathBuf>,
}

impl ProcessShell {
    pub fn new(name: &str) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_cwd(name, cwd)
    }

    pub fn with_cwd(name: &str, cwd: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            invocation: Invocation::for_shell(name),
            cwd: Mutex::new(cwd),
        }
    }

    pub fn cwd(&self) -> PathBuf {
        self.cwd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A lone `cd` changes the tracked directory instead of a child shell's.
    fn as_cd(command: &str) -> Option<Option<&str>> {
        let trimmed = command.trim();
        if trimmed.contains(['&', ';', '|', '\n']) {
            return None;
        }
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let head = parts.next()?;
        if !head.eq_ignore_ascii_case("cd") && !head.eq_ignore_ascii_case("set-location") {
            return None;
        }
        Some(
            parts
                .next()
                .map(|p| p.trim().trim_matches(['"', '\'']))
                .filter(|p| !p.is_empty()),
        )
    }

    fn change_dir(&self, target: Option<&str>) -> ShellOutput {
        let mut cwd = self.cwd.lock().unwrap_or_else(PoisonError::into_inner);
        let destination = match target {
            None | Some("~") => home_dir().unwrap_or_else(|| cwd.clone()),
            Some(t) if t.starts_with("~/") => match home_dir() {
                Some(home) => home.join(&t[2..]),
                None => cwd.join(t),
            },
            Some(t) => cwd.join(t),
        };
        match destination.canonicalize() {
            Ok(path) if path.is_dir() => {
                debug!(from = %cwd.display(), to = %path.display(), "Changed directory");
                *cwd = path;
                ShellOutput {
                    success: true,
                    output: Vec::new(),
                    exit_code: 0,
                }
            }
            _ => ShellOutput {
                success: false,
                output: format!("cd: no such directory: {}\n", destination.display()).into_bytes(),
                exit_code: 1,
            },
        }
    }

    fn spawn(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
        cwd: &Path,
    ) -> Result<Child, ShellError> {
        let mut cmd = Command::new(&self.invocation.program);
        cmd.args(&self.invocation.args)
            .arg(command)
            .current_dir(cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group; a timeout kills the whole group.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ShellError::Spawn(format!("{}: {e}", self.invocation.program)))?;

        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&bytes).await {
                    debug!(error = %e, "stdin closed early");
                }
            });
        }
        Ok(child)
    }
}

/// Kill every process in group `pgid`.
#[cfg(unix)]
async fn kill_group(pgid: u32) {
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pgid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(pgid, "Killed process group"),
        Ok(_) => debug!(pgid, "Process group already gone"),
        Err(e) => warn!(pgid, error = %e, "Could not kill process group"),
    }
}

#[cfg(not(unix))]
async fn kill_group(_pgid: u32) {}

#[async_trait]
impl ShellExecutionAdapter for ProcessShell {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        if let Some(target) = Self::as_cd(command) {
            return Ok(self.change_dir(target));
        }

        let cwd = self.cwd();
        debug!(command, cwd = %cwd.display(), shell = %self.invocation.program, "Spawning");
        let child = self.spawn(command, stdin, &cwd)?;
        let pgid = child.id();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ShellError::Spawn(e.to_string()))?,
            Err(_) => {
                if let Some(pgid) = pgid {
                    kill_group(pgid).await;
                }
                warn!(command, timeout_secs = timeout.as_secs(), "Command timed out, killed");
                return Err(ShellError::Timeout(timeout));
            }
        };

        let mut bytes = output.stdout;
        bytes.extend_from_slice(&output.stderr);
        Ok(ShellOutput {
            success: output.status.success(),
            output: bytes,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}
