//! Package-management backends.
//!
//! One [`PackageBackend`] implementation exists per package-manager family.
//! [`SoftwareManager`] resolves the backend matching the host tooling on first
//! use and keeps it for the rest of the process.
use std::sync::OnceLock;

use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, info, warn};

use crate::{
    error::SanityError,
    host::{Host, Invocation},
    scriptlet::ScriptletFailures,
    wait::Poll,
};

/// Package-manager tools the resolver understands, in detection order.
pub const SUPPORTED_TOOLS: [&str; 4] = ["apt-get", "dnf", "yum", "zypper"];

/// Package-manager family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum BackendKind {
    #[strum(serialize = "apt-get")]
    Apt,
    #[strum(serialize = "yum")]
    Yum,
    #[strum(serialize = "dnf")]
    Dnf,
    #[strum(serialize = "zypper")]
    Zypper,
}

/// Uniform contract over the supported package managers.
///
/// None of the operations fail hard: they report success as `true` and log
/// the reason when returning `false`.
pub trait PackageBackend {
    fn kind(&self) -> BackendKind;

    /// Base command line every operation is built on.
    fn base_command(&self) -> &str;

    /// Installs `name` with elevated privileges and records any scriptlet
    /// failures in `failures`. Returns `true` whenever the command exits
    /// successfully, even if a scriptlet failure was recorded.
    fn install(&self, host: &dyn Host, name: &str, failures: &mut ScriptletFailures) -> bool {
        let cmd = Invocation::new(format!("{} install {name}", self.base_command())).sudo();
        match host.run(&cmd) {
            Ok(output) => {
                failures.inspect(&output);
                true
            }
            Err(err) => {
                warn!("Installing {name} failed: {err}");
                false
            }
        }
    }

    /// Upgrades the whole system, or only `name` when given.
    fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> bool;

    fn remove(&self, host: &dyn Host, name: &str) -> bool {
        let cmd = Invocation::new(format!("{} remove {name}", self.base_command())).sudo();
        succeeded(host, &cmd)
    }
}

fn succeeded(host: &dyn Host, cmd: &Invocation) -> bool {
    match host.run(cmd) {
        Ok(_) => true,
        Err(err) => {
            debug!("`{cmd}` failed: {err}");
            false
        }
    }
}

/// Debian-family backend.
pub struct AptBackend {
    base_command: String,
    index_refresh: Poll,
}

impl AptBackend {
    const FORCE_CONFDEF: &'static str = "-o Dpkg::Options::=--force-confdef -o Dpkg::Options::=--force-confold";

    pub fn new(index_refresh: Poll) -> Self {
        Self {
            base_command: "apt-get -y".to_string(),
            index_refresh,
        }
    }

    fn update_index(&self, host: &dyn Host) -> bool {
        let cmd = Invocation::new(format!("{} update", self.base_command)).sudo();
        self.index_refresh
            .wait("Wait until package list is up to date...", || {
                succeeded(host, &cmd)
            })
    }
}

impl PackageBackend for AptBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Apt
    }

    fn base_command(&self) -> &str {
        &self.base_command
    }

    fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> bool {
        if !self.update_index(host) {
            warn!(
                "Package list could not be refreshed within {:?}",
                self.index_refresh.timeout
            );
            return false;
        }

        let line = match name {
            Some(name) => format!(
                "{} {} install --only-upgrade {name}",
                self.base_command,
                Self::FORCE_CONFDEF
            ),
            None => format!("{} {} upgrade", self.base_command, Self::FORCE_CONFDEF),
        };
        succeeded(host, &Invocation::new(line).shell().sudo())
    }
}

/// Red Hat yum backend.
pub struct YumBackend {
    base_command: String,
}

impl YumBackend {
    pub fn new() -> Self {
        Self {
            base_command: "yum -y".to_string(),
        }
    }
}

impl Default for YumBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBackend for YumBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Yum
    }

    fn base_command(&self) -> &str {
        &self.base_command
    }

    fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> bool {
        let line = match name {
            Some(name) => format!("{} update {name}", self.base_command),
            None => format!("{} update", self.base_command),
        };
        succeeded(host, &Invocation::new(line).sudo())
    }
}

/// Fedora dnf backend.
pub struct DnfBackend {
    base_command: String,
}

impl DnfBackend {
    pub fn new() -> Self {
        Self {
            base_command: "dnf -y".to_string(),
        }
    }
}

impl Default for DnfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBackend for DnfBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dnf
    }

    fn base_command(&self) -> &str {
        &self.base_command
    }

    fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> bool {
        let line = match name {
            Some(name) => format!("{} upgrade {name}", self.base_command),
            None => format!("{} upgrade", self.base_command),
        };
        succeeded(host, &Invocation::new(line).sudo())
    }
}

/// SUSE zypper backend.
pub struct ZypperBackend {
    base_command: String,
}

impl ZypperBackend {
    pub fn new() -> Self {
        Self {
            base_command: "zypper -n".to_string(),
        }
    }
}

impl Default for ZypperBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBackend for ZypperBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Zypper
    }

    fn base_command(&self) -> &str {
        &self.base_command
    }

    fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> bool {
        let refresh = Invocation::new(format!("{} refresh", self.base_command)).sudo();
        if !succeeded(host, &refresh) {
            return false;
        }
        let line = match name {
            Some(name) => format!("{} update {name}", self.base_command),
            None => format!("{} update", self.base_command),
        };
        succeeded(host, &Invocation::new(line).sudo())
    }
}

/// Maps a detected tool name to its backend.
pub fn backend_for_tool(
    tool: &str,
    index_refresh: Poll,
) -> Result<Box<dyn PackageBackend>, SanityError> {
    let kind: BackendKind = tool
        .parse()
        .map_err(|_| SanityError::UnsupportedPackageManager(tool.to_string()))?;

    Ok(match kind {
        BackendKind::Apt => Box::new(AptBackend::new(index_refresh)),
        BackendKind::Yum => Box::new(YumBackend::new()),
        BackendKind::Dnf => Box::new(DnfBackend::new()),
        BackendKind::Zypper => Box::new(ZypperBackend::new()),
    })
}

/// Returns the package-management tool available on the host. `dnf` wins over
/// `yum` when both are installed.
pub fn detect_tool(host: &dyn Host) -> Result<&'static str, SanityError> {
    SUPPORTED_TOOLS
        .iter()
        .copied()
        .find(|tool| host.find_command(tool).is_some())
        .ok_or_else(|| SanityError::UnsupportedPackageManager("none detected".to_string()))
}

/// Lazily resolved, process-wide package backend.
pub struct SoftwareManager {
    backend: OnceLock<Box<dyn PackageBackend>>,
    index_refresh: Poll,
}

impl SoftwareManager {
    pub fn new(index_refresh: Poll) -> Self {
        Self {
            backend: OnceLock::new(),
            index_refresh,
        }
    }

    /// Returns the active backend, inspecting the host only on first call.
    pub fn backend(&self, host: &dyn Host) -> Result<&dyn PackageBackend, SanityError> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend.as_ref());
        }

        let tool = detect_tool(host)?;
        let backend = backend_for_tool(tool, self.index_refresh)?;
        info!("Using {} package backend", backend.kind());
        Ok(self.backend.get_or_init(|| backend).as_ref())
    }

    pub fn install(
        &self,
        host: &dyn Host,
        name: &str,
        failures: &mut ScriptletFailures,
    ) -> Result<bool, SanityError> {
        Ok(self.backend(host)?.install(host, name, failures))
    }

    pub fn upgrade(&self, host: &dyn Host, name: Option<&str>) -> Result<bool, SanityError> {
        Ok(self.backend(host)?.upgrade(host, name))
    }

    pub fn remove(&self, host: &dyn Host, name: &str) -> Result<bool, SanityError> {
        Ok(self.backend(host)?.remove(host, name))
    }
}
