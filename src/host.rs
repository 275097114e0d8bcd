//! Host access: command execution and filesystem/network probes.
//!
//! Every component reaches the machine under test through [`Host`], so the
//! orchestration logic can run unchanged against [`SystemHost`] or the
//! simulated host in [`crate::mock`].
use std::{
    fmt, fs,
    io::{self, Read},
    net::{SocketAddr, TcpStream},
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{
    sys::{
        signal::{Signal, killpg},
        stat,
    },
    unistd::{Pid, geteuid},
};
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::CommandError;

/// Describes one command to run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command line, interpreted by `sh -c` when `shell` is set.
    pub command: String,
    /// Run with elevated privileges.
    pub sudo: bool,
    /// Hand the line to a shell instead of splitting on whitespace.
    pub shell: bool,
    /// Kill the process once this elapses.
    pub timeout: Option<Duration>,
    /// Treat a non-zero exit as a normal result in [`Host::run`].
    pub ignore_status: bool,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            sudo: false,
            shell: false,
            timeout: None,
            ignore_status: false,
        }
    }

    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    pub fn shell(mut self) -> Self {
        self.shell = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ignore_status(mut self) -> Self {
        self.ignore_status = true;
        self
    }

    /// The command line as it will be executed by the current user.
    pub fn render(&self, as_root: bool) -> String {
        if self.sudo && !as_root {
            format!("sudo {}", self.command)
        } else {
            self.command.clone()
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Exit code and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Concatenation of stdout and stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// The machine under test.
pub trait Host {
    /// Runs a command and returns its result whatever the exit code.
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;

    /// Looks up an executable on `PATH`.
    fn find_command(&self, name: &str) -> Option<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    fn is_mount_point(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Whether something is listening on `port` on the local host.
    fn port_in_use(&self, port: u16) -> bool;

    /// Issues a GET request and returns the response body.
    fn http_get(&self, url: &str) -> Result<String, CommandError>;

    /// Runs a command, failing on a non-zero exit unless the invocation ignores it.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let output = self.execute(invocation)?;
        if output.is_success() || invocation.ignore_status {
            Ok(output)
        } else {
            Err(CommandError::NonZeroExit {
                command: invocation.command.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Init system supervising the product units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    SysV,
}

impl InitSystem {
    /// Reads the name of PID 1.
    pub fn detect(host: &dyn Host) -> Self {
        match host.read_to_string(Path::new("/proc/1/comm")) {
            Ok(comm) if comm.contains("systemd") => InitSystem::Systemd,
            _ => InitSystem::SysV,
        }
    }

    pub fn is_systemd(&self) -> bool {
        matches!(self, InitSystem::Systemd)
    }
}

/// Runs commands and probes on the local machine.
pub struct SystemHost {
    as_root: bool,
    client: Client,
}

impl SystemHost {
    pub fn new() -> Result<Self, CommandError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CommandError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;

        Ok(Self {
            as_root: geteuid().is_root(),
            client,
        })
    }

    /// Builds the command in its own process group so a timeout can take
    /// down everything it spawned.
    fn build_command(&self, invocation: &Invocation) -> Result<Command, CommandError> {
        let line = invocation.render(self.as_root);
        let mut cmd = if invocation.shell {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        } else {
            let mut parts = line.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| CommandError::NotFound(invocation.command.clone()))?;
            let mut cmd = Command::new(program);
            cmd.args(parts);
            cmd
        };
        cmd.process_group(0);
        Ok(cmd)
    }
}

impl Host for SystemHost {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let rendered = invocation.render(self.as_root);
        debug!("Running `{rendered}`");

        let spawn_err = |source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        };

        let mut child = self
            .build_command(invocation)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match invocation.timeout {
            Some(timeout) => match wait_with_timeout(&mut child, timeout).map_err(spawn_err)? {
                Some(status) => status,
                None => {
                    terminate_group(&mut child);
                    return Err(CommandError::TimedOut {
                        command: rendered.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait().map_err(spawn_err)?,
        };

        let output = CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };
        debug!("`{rendered}` exited with {}", output.exit_code);
        Ok(output)
    }

    fn find_command(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        let Ok(own) = stat::stat(path) else {
            return false;
        };
        let Ok(parent) = stat::stat(&path.join("..")) else {
            return false;
        };
        own.st_dev != parent.st_dev || own.st_ino == parent.st_ino
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn port_in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        TcpStream::connect_timeout(&addr, Duration::from_secs(1)).is_ok()
    }

    fn http_get(&self, url: &str) -> Result<String, CommandError> {
        let http_err = |message: String| CommandError::Http {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| http_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(http_err(format!("status {}", response.status())));
        }
        response.text().map_err(|err| http_err(err.to_string()))
    }
}

/// Reads a child stream to completion on a helper thread so large outputs
/// cannot fill the pipe while we wait on the process.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Signals the child's whole process group: SIGTERM first so `sudo` can relay
/// it, then SIGKILL for anything still alive after the grace period.
fn terminate_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to process group {pgid} failed: {err}");
    }
    if let Ok(Some(_)) = wait_with_timeout(child, KILL_GRACE) {
        let _ = killpg(pgid, Signal::SIGKILL);
        return;
    }
    if let Err(err) = killpg(pgid, Signal::SIGKILL) {
        debug!("SIGKILL to process group {pgid} failed: {err}");
    }
    let _ = child.kill();
    let _ = child.wait();
}

const KILL_GRACE: Duration = Duration::from_secs(2);

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn host() -> SystemHost {
        SystemHost::new().expect("host")
    }

    #[test]
    fn sudo_prefix_is_dropped_for_root() {
        let inv = Invocation::new("apt-get update").sudo();
        assert_eq!(inv.render(false), "sudo apt-get update");
        assert_eq!(inv.render(true), "apt-get update");
        assert_eq!(Invocation::new("ls").render(false), "ls");
    }

    #[test]
    fn execute_captures_streams_and_exit_code() {
        let output = host()
            .execute(&Invocation::new("echo out; echo err >&2; exit 3").shell())
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn run_rejects_non_zero_exit_unless_ignored() {
        let host = host();
        let err = host.run(&Invocation::new("false")).unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { exit_code: 1, .. }));

        let output = host.run(&Invocation::new("false").ignore_status()).unwrap();
        assert_eq!(output.exit_code, 1);
    }

    #[test]
    fn timeout_kills_long_running_commands() {
        let err = host()
            .execute(&Invocation::new("sleep 5").timeout(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    fn running(pid: &str) -> bool {
        fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| {
                let state = stat.rsplit(')').next().unwrap_or_default().trim_start();
                !state.starts_with('Z') && !state.starts_with('X')
            })
            .unwrap_or(false)
    }

    #[test]
    fn timeout_takes_down_shell_descendants() {
        let dir = tempdir().unwrap();
        let pid_file = dir.path().join("sleeper.pid");
        let line = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let err = host()
            .execute(&Invocation::new(line).shell().timeout(Duration::from_millis(300)))
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));

        let pid = fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let deadline = Instant::now() + Duration::from_secs(3);
        while running(&pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!running(&pid), "background sleep {pid} outlived the timeout");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = host()
            .execute(&Invocation::new("definitely-not-a-real-binary-xyz"))
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn root_is_a_mount_point_and_tempdir_is_not() {
        let host = host();
        let dir = tempdir().unwrap();
        assert!(host.is_mount_point(Path::new("/")));
        assert!(!host.is_mount_point(&dir.path().join("missing")));
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        assert!(!host.is_mount_point(&nested));
    }

    #[test]
    fn write_file_creates_parent_directories() {
        let host = host();
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/marker");
        host.write_file(&path, "x").unwrap();
        assert_eq!(host.read_to_string(&path).unwrap(), "x");
        assert!(host.exists(&path));
    }
}
