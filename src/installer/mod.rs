//! Installer variant selection and the shared install procedure.
//!
//! [`select`] maps a [`Platform`] (plus the cloud-image flag) to exactly one
//! [`Variant`]. Package variants are described by a [`variants::Descriptor`]
//! and run the same seven steps through [`Installer::run`]; the AMI variant
//! only validates the preinstalled image (see [`ami`]).
use std::{fmt, path::Path, str::FromStr};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    constants::{
        DATA_DIR, HOUSEKEEPING_MARK, HOUSEKEEPING_UUID, NO_CPUSCALING_FLAG, NODE_EXPORTER,
        SECONDARY_DISK_GLOB, SETUP_SCRIPT,
    },
    error::SanityError,
    host::{Host, Invocation},
    packages::SoftwareManager,
    scriptlet::ScriptletFailures,
    service::ServiceManager,
    verify::{VerificationReport, Verifier, VerifyContext},
};

pub mod ami;
pub mod variants;

use variants::Descriptor;

/// Distribution family, deciding repository layout and verification idioms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Family {
    Debian,
    RedHat,
}

impl Family {
    /// Classifies a distribution name.
    pub fn of(distro: &str) -> Self {
        let distro = distro.to_lowercase();
        if distro.contains("ubuntu") || distro.contains("debian") {
            Family::Debian
        } else {
            Family::RedHat
        }
    }
}

/// Name, major version and minor release of the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub release: String,
}

impl Platform {
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            version: version.to_string(),
            release: release.to_string(),
        }
    }

    /// Reads `/etc/os-release` on the host.
    pub fn detect(host: &dyn Host) -> Result<Self, SanityError> {
        let content = host.read_to_string(Path::new("/etc/os-release"))?;
        Self::from_os_release(&content)
    }

    /// Parses the `ID` and `VERSION_ID` keys of an os-release file.
    pub fn from_os_release(content: &str) -> Result<Self, SanityError> {
        let value = |key: &str| {
            content.lines().find_map(|line| {
                let (name, value) = line.split_once('=')?;
                (name.trim() == key).then(|| value.trim().trim_matches('"').to_string())
            })
        };

        let name = value("ID")
            .ok_or_else(|| SanityError::UnsupportedPlatform("os-release has no ID".into()))?;
        let version_id = value("VERSION_ID").unwrap_or_default();
        let (version, release) = version_id.split_once('.').unwrap_or((&version_id, ""));
        Ok(Self::new(&name, version, release))
    }

    pub fn family(&self) -> Family {
        Family::of(&self.name)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.release.is_empty() {
            write!(f, "{} {}", self.name, self.version)
        } else {
            write!(f, "{} {}.{}", self.name, self.version, self.release)
        }
    }
}

/// Which packages and repository an install targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Build under test, from the supplied repository descriptor.
    #[default]
    Ci,
    /// Published release, from the supplied repository descriptor.
    Release,
    /// A historical release tag such as `1.1` or `unstable`.
    Pinned(String),
}

impl InstallMode {
    pub fn is_ci(&self) -> bool {
        matches!(self, InstallMode::Ci)
    }
}

impl FromStr for InstallMode {
    type Err = SanityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(SanityError::Config("install mode cannot be empty".into())),
            "ci" => Ok(InstallMode::Ci),
            "release" => Ok(InstallMode::Release),
            tag => Ok(InstallMode::Pinned(tag.to_string())),
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMode::Ci => f.write_str("ci"),
            InstallMode::Release => f.write_str("release"),
            InstallMode::Pinned(tag) => f.write_str(tag),
        }
    }
}

/// Distributions with a package installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum Distro {
    #[strum(serialize = "ubuntu-14.04")]
    Ubuntu1404,
    #[strum(serialize = "ubuntu-16.04")]
    Ubuntu1604,
    #[strum(serialize = "debian-8")]
    Debian8,
    #[strum(serialize = "fedora-22")]
    Fedora22,
    #[strum(serialize = "centos-7")]
    CentOS7,
}

/// The installer chosen for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Package(Distro),
    Ami,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Package(distro) => write!(f, "{distro}"),
            Variant::Ami => f.write_str("ami"),
        }
    }
}

/// Picks the installer variant for a platform. Unknown platforms are an error.
pub fn select(platform: &Platform, ami: bool) -> Result<Variant, SanityError> {
    if ami {
        return Ok(Variant::Ami);
    }

    let distro = match (
        platform.name.as_str(),
        platform.version.as_str(),
        platform.release.as_str(),
    ) {
        ("ubuntu", "14", "04") => Distro::Ubuntu1404,
        ("ubuntu", "16", "04") => Distro::Ubuntu1604,
        ("debian", "8", _) => Distro::Debian8,
        ("fedora", "22", _) => Distro::Fedora22,
        ("centos", "7", _) => Distro::CentOS7,
        _ => return Err(SanityError::UnsupportedPlatform(platform.to_string())),
    };
    Ok(Variant::Package(distro))
}

/// Lists secondary block devices and returns the last one, if any.
pub fn detect_secondary_device(host: &dyn Host) -> Result<Option<String>, SanityError> {
    let listing = host.execute(
        &Invocation::new(format!("ls {SECONDARY_DISK_GLOB}"))
            .shell()
            .ignore_status(),
    )?;
    Ok(listing.stdout.split_whitespace().last().map(str::to_string))
}

/// Runs one installer variant against a host.
pub struct Installer<'a> {
    host: &'a dyn Host,
    software: &'a SoftwareManager,
    services: &'a ServiceManager,
    settings: &'a Settings,
    platform: &'a Platform,
}

impl<'a> Installer<'a> {
    pub fn new(
        host: &'a dyn Host,
        software: &'a SoftwareManager,
        services: &'a ServiceManager,
        settings: &'a Settings,
        platform: &'a Platform,
    ) -> Self {
        Self {
            host,
            software,
            services,
            settings,
            platform,
        }
    }

    /// Runs the variant and returns the verification report it produced.
    ///
    /// Scriptlet failures observed while installing are appended to
    /// `failures`; they never fail this call.
    pub fn run(
        &self,
        variant: Variant,
        failures: &mut ScriptletFailures,
    ) -> Result<VerificationReport, SanityError> {
        info!("Running {variant} installer on {}", self.platform);
        match variant {
            Variant::Ami => ami::AmiValidator::new(self.host).run(self.services, self.settings),
            Variant::Package(distro) => {
                let descriptor = variants::lookup(distro)
                    .ok_or_else(|| SanityError::UnsupportedPlatform(distro.to_string()))?;
                self.install(descriptor, failures)
            }
        }
    }

    fn install(
        &self,
        descriptor: &Descriptor,
        failures: &mut ScriptletFailures,
    ) -> Result<VerificationReport, SanityError> {
        self.upgrade_system()?;

        let packages = variants::setup_packages(
            self.host,
            self.software,
            descriptor,
            &self.settings.mode,
            self.settings.sw_repo.as_deref(),
        )?;

        for package in &packages {
            if !self.software.install(self.host, package, failures)? {
                let package = Path::new(package)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| package.clone());
                return Err(SanityError::InstallPackage { package });
            }
        }

        let secondary_device = self.configure_host()?;

        self.services.start_services()?;
        self.services.wait_services_up()?;
        report_identifier(self.host, self.settings)?;

        let ctx = VerifyContext {
            family: descriptor.family,
            distro: self.platform.name.clone(),
            init: self.services.init_system(),
            secondary_device,
        };
        Ok(Verifier::new(self.host, &ctx).full())
    }

    fn upgrade_system(&self) -> Result<(), SanityError> {
        let backend = self.software.backend(self.host)?;
        let poll = self.settings.timing.index_refresh;
        if !poll.wait("Wait until system is up to date...", || {
            backend.upgrade(self.host, None)
        }) {
            warn!("System upgrade did not succeed within {:?}, continuing", poll.timeout);
        }
        Ok(())
    }

    /// Runs the product setup script and returns the detected secondary device.
    fn configure_host(&self) -> Result<Option<String>, SanityError> {
        let device = detect_secondary_device(self.host)?;
        let mut setup = format!("{SETUP_SCRIPT} --nic eth0");

        match &device {
            Some(device) if !self.host.is_mount_point(Path::new(DATA_DIR)) => {
                setup.push_str(&format!(" --disks {device}"));
            }
            _ => setup.push_str(" --no-raid-setup"),
        }

        if self.host.exists(Path::new(NODE_EXPORTER)) {
            setup.push_str(" --no-node-exporter");
        }

        let script = self.host.read_to_string(Path::new(SETUP_SCRIPT))?;
        if script.contains(NO_CPUSCALING_FLAG) {
            setup.push(' ');
            setup.push_str(NO_CPUSCALING_FLAG);
        }

        info!("Configuring host: {setup}");
        self.host.run(&Invocation::new(setup).sudo().shell())?;
        Ok(device)
    }
}

/// Reports the housekeeping identifier once per installation.
///
/// Waits for the identifier file, then sends it to the report endpoint and
/// writes the marker. Hosts that already carry the marker are left alone.
pub fn report_identifier(host: &dyn Host, settings: &Settings) -> Result<(), SanityError> {
    let uuid_path = Path::new(HOUSEKEEPING_UUID);
    let mark_path = Path::new(HOUSEKEEPING_MARK);

    settings
        .timing
        .uuid_wait
        .wait("Waiting for housekeeping.uuid generated", || {
            host.exists(uuid_path)
        });

    if !host.exists(uuid_path) {
        warn!("{HOUSEKEEPING_UUID} never appeared, skipping identifier report");
        return Ok(());
    }
    if host.exists(mark_path) {
        debug!("Identifier already reported");
        return Ok(());
    }

    let uuid = host.read_to_string(uuid_path)?.trim().to_string();
    debug!("housekeeping.uuid is {uuid}");
    host.http_get(&format!("{}?uu={uuid}&mark=scylla", settings.report_url))?;
    host.run(&Invocation::new(format!("sudo -u scylla touch {HOUSEKEEPING_MARK}")).shell())?;
    info!("Reported housekeeping identifier {uuid}");
    Ok(())
}
