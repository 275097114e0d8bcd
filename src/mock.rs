//! Simulated host used by the test suites.
//!
//! `MockHost` keeps a small model of the machine: service unit states, files,
//! mount points, symlinks and scripted command responses. Service control
//! commands, `curl -o`, `touch` and the setup script mutate the model the way
//! the real tools would, so installer runs can be exercised end to end.
use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::{
    constants::{
        CQL_PORT, DATA_COREDUMP_DIR, DATA_DIR, HOUSEKEEPING_UUID, SECONDARY_DISK_GLOB,
        SERVICE_UNITS, SETUP_SCRIPT, SYSTEMD_COREDUMP_DIR,
    },
    error::CommandError,
    host::{CommandOutput, Host, Invocation},
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    output: CommandOutput,
}

#[derive(Debug, Default)]
struct MockState {
    commands: HashSet<String>,
    files: HashMap<PathBuf, String>,
    mounts: HashSet<PathBuf>,
    links: HashMap<PathBuf, PathBuf>,
    rules: Vec<Rule>,
    http_rules: Vec<(String, Result<String, String>)>,
    units: HashMap<String, bool>,
    stuck_units: HashSet<String>,
    sticky_units: HashSet<String>,
    port_blocked: bool,
    executed: Vec<String>,
    requests: Vec<String>,
}

/// A scripted, stateful stand-in for the machine under test.
pub struct MockHost {
    state: Mutex<MockState>,
}

impl Default for MockHost {
    fn default() -> Self {
        let mut state = MockState::default();
        state
            .files
            .insert(PathBuf::from("/proc/1/comm"), "systemd\n".to_string());
        for unit in ["collectd", "ntpd", "ntp"] {
            state.units.insert(unit.to_string(), true);
        }

        let host = Self {
            state: Mutex::new(state),
        };
        host.respond(
            SECONDARY_DISK_GLOB,
            CommandOutput::failure(2, "ls: cannot access '/dev/[hvs]db': No such file or directory\n"),
        )
        .respond("getenforce", CommandOutput::success("Permissive\n"))
        .respond(
            "coredumpctl info",
            CommandOutput::failure(1, "No coredumps found.\n"),
        )
        .respond(
            "sysctl kernel.core_pattern",
            CommandOutput::success(
                "kernel.core_pattern = |/usr/lib/scylla/scylla_save_coredump %e %t %p\n",
            ),
        )
        .respond(
            "apt-cache show",
            CommandOutput::success("Package: scylla\nVersion: 1.7.0-0.20170405.3b5fd3c-1\n"),
        )
        .respond(
            "nodetool status",
            CommandOutput::success("UN  127.0.0.1  1.2 MB  256  100.0%  rack1\n"),
        )
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes `name` resolvable through [`Host::find_command`].
    pub fn with_command(self, name: &str) -> Self {
        self.lock().commands.insert(name.to_string());
        self
    }

    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        self.lock()
            .files
            .insert(path.as_ref().to_path_buf(), contents.to_string());
        self
    }

    pub fn with_mount(self, path: impl AsRef<Path>) -> Self {
        self.lock().mounts.insert(path.as_ref().to_path_buf());
        self
    }

    /// PID 1 is a classic init instead of systemd.
    pub fn with_sysv_init(self) -> Self {
        self.with_file("/proc/1/comm", "init\n")
    }

    pub fn with_secondary_disk(self, device: &str) -> Self {
        self.respond(SECONDARY_DISK_GLOB, CommandOutput::success(format!("{device}\n")))
    }

    pub fn with_housekeeping_uuid(self, uuid: &str) -> Self {
        self.with_file(HOUSEKEEPING_UUID, &format!("{uuid}\n"))
    }

    pub fn with_unit_state(self, unit: &str, active: bool) -> Self {
        self.lock().units.insert(unit.to_string(), active);
        self
    }

    /// The unit never reaches the active state.
    pub fn with_stuck_unit(self, unit: &str) -> Self {
        self.lock().stuck_units.insert(unit.to_string());
        self
    }

    /// The unit ignores stop requests.
    pub fn with_sticky_unit(self, unit: &str) -> Self {
        self.lock().sticky_units.insert(unit.to_string());
        self
    }

    /// The client port stays free even when every unit is active.
    pub fn with_port_blocked(self) -> Self {
        self.lock().port_blocked = true;
        self
    }

    /// Scripts the result of every command containing `pattern`. Later rules
    /// take precedence over earlier ones and over the built-in behaviour.
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            output,
        });
        self
    }

    pub fn respond_http(self, url_fragment: &str, body: &str) -> Self {
        self.lock()
            .http_rules
            .push((url_fragment.to_string(), Ok(body.to_string())));
        self
    }

    pub fn fail_http(self, url_fragment: &str, message: &str) -> Self {
        self.lock()
            .http_rules
            .push((url_fragment.to_string(), Err(message.to_string())));
        self
    }

    /// Every command executed so far, without privilege prefixes.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Whether any executed command contains `fragment`.
    pub fn ran(&self, fragment: &str) -> bool {
        self.lock().executed.iter().any(|cmd| cmd.contains(fragment))
    }

    /// Every URL requested so far.
    pub fn http_requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    pub fn unit_active(&self, unit: &str) -> bool {
        self.lock().units.get(unit).copied().unwrap_or(false)
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    pub fn mounted(&self, path: impl AsRef<Path>) -> bool {
        self.lock().mounts.contains(path.as_ref())
    }
}

impl MockState {
    fn scripted(&self, command: &str) -> Option<CommandOutput> {
        self.rules
            .iter()
            .rev()
            .find(|rule| command.contains(&rule.pattern))
            .map(|rule| rule.output.clone())
    }

    fn control_unit(&mut self, unit: &str, action: &str) -> Option<CommandOutput> {
        let unit = unit.trim_end_matches(".service").to_string();
        let active = self.units.get(&unit).copied().unwrap_or(false);
        match action {
            "start" => {
                if !self.stuck_units.contains(&unit) {
                    self.units.insert(unit, true);
                }
                Some(CommandOutput::default())
            }
            "stop" => {
                if !self.sticky_units.contains(&unit) {
                    self.units.insert(unit, false);
                }
                Some(CommandOutput::default())
            }
            "restart" => {
                let up = !self.stuck_units.contains(&unit);
                self.units.insert(unit, up);
                Some(CommandOutput::default())
            }
            "is-active" | "status" => Some(if active {
                CommandOutput::success(format!("{unit} is running\nactive\n"))
            } else {
                CommandOutput {
                    exit_code: 3,
                    stdout: format!("{unit} is stopped\ninactive\n"),
                    stderr: String::new(),
                }
            }),
            _ => None,
        }
    }

    fn builtin(&mut self, command: &str) -> Option<CommandOutput> {
        let tokens: Vec<&str> = command.split_whitespace().collect();

        match tokens.as_slice() {
            ["systemctl", action, unit, ..] => return self.control_unit(unit, action),
            ["service", unit, action, ..] => return self.control_unit(unit, action),
            _ => {}
        }

        if command.contains(SETUP_SCRIPT) {
            if command.contains("--disks") {
                self.mounts.insert(PathBuf::from(DATA_DIR));
                self.links.insert(
                    PathBuf::from(SYSTEMD_COREDUMP_DIR),
                    PathBuf::from(DATA_COREDUMP_DIR),
                );
            }
            return Some(CommandOutput::default());
        }

        if tokens.first() == Some(&"curl")
            && let Some(idx) = tokens.iter().position(|token| *token == "-o")
            && let Some(dst) = tokens.get(idx + 1)
        {
            let src = tokens.get(1).copied().unwrap_or_default();
            self.files.insert(PathBuf::from(dst), format!("# {src}\n"));
            return Some(CommandOutput::default());
        }

        if let Some(idx) = tokens.iter().position(|token| *token == "touch")
            && let Some(path) = tokens.get(idx + 1)
        {
            self.files.entry(PathBuf::from(path)).or_default();
            return Some(CommandOutput::default());
        }

        None
    }
}

impl Host for MockHost {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let mut state = self.lock();
        let command = invocation.command.clone();
        state.executed.push(command.clone());

        if let Some(output) = state.scripted(&command) {
            return Ok(output);
        }
        Ok(state.builtin(&command).unwrap_or_default())
    }

    fn find_command(&self, name: &str) -> Option<PathBuf> {
        self.lock()
            .commands
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.mounts.contains(path) || state.links.contains_key(path)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.lock().mounts.contains(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.lock().files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.lock()
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.lock();
        if let Some(target) = state.links.get(path) {
            return Ok(target.clone());
        }
        if state.files.contains_key(path) || state.mounts.contains(path) {
            return Ok(path.to_path_buf());
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }

    fn port_in_use(&self, port: u16) -> bool {
        let state = self.lock();
        port == CQL_PORT
            && !state.port_blocked
            && SERVICE_UNITS
                .iter()
                .all(|unit| state.units.get(*unit).copied().unwrap_or(false))
    }

    fn http_get(&self, url: &str) -> Result<String, CommandError> {
        let mut state = self.lock();
        state.requests.push(url.to_string());
        match state
            .http_rules
            .iter()
            .rev()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
        {
            Some((_, Ok(body))) => Ok(body.clone()),
            Some((_, Err(message))) => Err(CommandError::Http {
                url: url.to_string(),
                message: message.clone(),
            }),
            None => Ok(String::new()),
        }
    }
}
