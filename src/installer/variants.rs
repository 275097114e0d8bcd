//! Per-distribution installer descriptors and the hooks that interpret them.
use tracing::{debug, info, warn};

use super::{Distro, Family, InstallMode};
use crate::{
    constants::{APT_REPO_DST, YUM_REPO_DST},
    error::SanityError,
    host::{Host, Invocation},
    packages::SoftwareManager,
    version::{self, Version},
};

/// Minimum product version that needs the Java prerequisite, and how to read
/// the candidate version out of `apt-cache show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub pattern: &'static str,
    pub minimum: &'static str,
}

/// Where an OpenJDK 8 runtime comes from on distributions that lack one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaSource {
    OpenJdkPpa,
    JessieBackports,
}

impl JavaSource {
    fn commands(&self) -> Vec<Invocation> {
        let mut commands = match self {
            JavaSource::OpenJdkPpa => vec![
                Invocation::new("apt-get install software-properties-common -y"),
                Invocation::new("add-apt-repository -y ppa:openjdk-r/ppa"),
                Invocation::new("apt-get update"),
                Invocation::new("apt-get install -y openjdk-8-jre-headless"),
            ],
            JavaSource::JessieBackports => vec![
                Invocation::new(
                    "sh -c \"echo 'deb http://http.debian.net/debian jessie-backports main' > /etc/apt/sources.list.d/jessie-backports.list\"",
                ),
                Invocation::new("apt-get update"),
                Invocation::new("apt-get install -y -t jessie-backports openjdk-8-jre-headless"),
            ],
        };
        commands.push(Invocation::new(
            "update-java-alternatives -s java-1.8.0-openjdk-amd64",
        ));
        commands
            .into_iter()
            .map(|cmd| cmd.sudo().shell())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisite {
    pub source: JavaSource,
    pub ci_gate: Gate,
    pub release_gate: Gate,
}

/// Static description of one distribution's install procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub distro: Distro,
    pub family: Family,
    /// Where the repository descriptor is written.
    pub repo_destination: &'static str,
    /// System packages removed before the repository is registered.
    pub conflicts: &'static [&'static str],
    pub java: Option<Prerequisite>,
    /// Non-CI modes resolve through [`LEGACY_FEDORA_REPOS`].
    pub legacy_repos: bool,
}

const RELEASE_GATE: Gate = Gate {
    pattern: r"Version: (.*)",
    minimum: "1.7~rc0",
};

const DESCRIPTORS: &[Descriptor] = &[
    Descriptor {
        distro: Distro::Ubuntu1404,
        family: Family::Debian,
        repo_destination: APT_REPO_DST,
        conflicts: &[],
        java: Some(Prerequisite {
            source: JavaSource::OpenJdkPpa,
            ci_gate: Gate {
                pattern: r"Version: ([\d.]+)",
                minimum: "1.7",
            },
            release_gate: RELEASE_GATE,
        }),
        legacy_repos: false,
    },
    Descriptor {
        distro: Distro::Ubuntu1604,
        family: Family::Debian,
        repo_destination: APT_REPO_DST,
        conflicts: &[],
        java: None,
        legacy_repos: false,
    },
    Descriptor {
        distro: Distro::Debian8,
        family: Family::Debian,
        repo_destination: APT_REPO_DST,
        conflicts: &[],
        java: Some(Prerequisite {
            source: JavaSource::JessieBackports,
            ci_gate: RELEASE_GATE,
            release_gate: RELEASE_GATE,
        }),
        legacy_repos: false,
    },
    Descriptor {
        distro: Distro::Fedora22,
        family: Family::RedHat,
        repo_destination: YUM_REPO_DST,
        conflicts: &[],
        java: None,
        legacy_repos: true,
    },
    Descriptor {
        distro: Distro::CentOS7,
        family: Family::RedHat,
        repo_destination: YUM_REPO_DST,
        conflicts: &["boost-thread", "boost-system", "abrt"],
        java: None,
        legacy_repos: false,
    },
];

/// Historical Fedora repositories by release tag.
pub const LEGACY_FEDORA_REPOS: &[(&str, &str, &[&str])] = &[
    (
        "1.0",
        "http://downloads.scylladb.com/rpm/fedora/scylla-1.0.repo",
        &["scylla-server", "scylla-jmx", "scylla-tools"],
    ),
    (
        "1.1",
        "http://downloads.scylladb.com/rpm/fedora/scylla-1.1.repo",
        &["scylla-server", "scylla-jmx", "scylla-tools"],
    ),
    (
        "1.2",
        "http://downloads.scylladb.com/rpm/fedora/scylla-1.2.repo",
        &["scylla"],
    ),
    (
        "unstable",
        "http://downloads.scylladb.com/rpm/unstable/fedora/master/latest/scylla.repo",
        &["scylla"],
    ),
];

/// Tag used when a legacy-repository distribution runs in plain release mode.
/// Its whole package trio is installed; registering the repository alone would
/// leave nothing for the service and verification steps to exercise.
const LEGACY_DEFAULT_TAG: &str = "1.1";

pub fn lookup(distro: Distro) -> Option<&'static Descriptor> {
    DESCRIPTORS.iter().find(|descriptor| descriptor.distro == distro)
}

/// Repository source and package list for one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPlan {
    pub source: String,
    pub packages: Vec<String>,
}

/// Decides which repository to register and which packages to install.
///
/// Legacy-repository distributions outside CI mode ignore `sw_repo`: a pinned
/// tag picks its row of [`LEGACY_FEDORA_REPOS`], and plain release mode takes
/// the full [`LEGACY_DEFAULT_TAG`] row, packages included, rather than
/// registering that repository with an empty package list.
pub fn resolve_packages(
    descriptor: &Descriptor,
    mode: &InstallMode,
    sw_repo: Option<&str>,
) -> Result<RepoPlan, SanityError> {
    if descriptor.legacy_repos && !mode.is_ci() {
        let tag = match mode {
            InstallMode::Pinned(tag) => tag.as_str(),
            _ => LEGACY_DEFAULT_TAG,
        };
        let (_, source, packages) = LEGACY_FEDORA_REPOS
            .iter()
            .find(|(known, _, _)| *known == tag)
            .ok_or_else(|| {
                SanityError::Config(format!(
                    "no {} repository is known for release tag '{tag}'",
                    descriptor.distro
                ))
            })?;
        return Ok(RepoPlan {
            source: source.to_string(),
            packages: packages.iter().map(|name| name.to_string()).collect(),
        });
    }

    let source = sw_repo
        .map(str::trim)
        .filter(|repo| !repo.is_empty())
        .ok_or_else(|| {
            SanityError::Config(format!("sw_repo is required to install in {mode} mode"))
        })?;
    let package = if mode.is_ci() {
        "scylla"
    } else {
        "scylla-enterprise"
    };
    Ok(RepoPlan {
        source: source.to_string(),
        packages: vec![package.to_string()],
    })
}

/// Downloads the repository descriptor to its family-specific location.
pub fn register_repository(
    host: &dyn Host,
    source: &str,
    destination: &str,
) -> Result<(), SanityError> {
    info!("Registering repository {source} at {destination}");
    host.run(
        &Invocation::new(format!("curl {source} -o {destination}"))
            .sudo()
            .shell(),
    )?;
    Ok(())
}

/// Installs the Java runtime when the candidate `package` version meets the
/// descriptor's gate. Returns whether anything was provisioned.
pub fn provision_prerequisites(
    host: &dyn Host,
    descriptor: &Descriptor,
    mode: &InstallMode,
    package: &str,
) -> Result<bool, SanityError> {
    let Some(prerequisite) = &descriptor.java else {
        return Ok(false);
    };

    host.run(&Invocation::new("apt-get update").sudo())?;
    let shown = host.run(&Invocation::new(format!("apt-cache show {package}")).sudo())?;

    let gate = if mode.is_ci() {
        &prerequisite.ci_gate
    } else {
        &prerequisite.release_gate
    };
    let candidate = Version::extract(gate.pattern, &shown.stdout)?;
    if !version::meets(&candidate, gate.minimum)? {
        info!(
            "{package} {candidate} is below {}, Java runtime not needed",
            gate.minimum
        );
        return Ok(false);
    }

    info!("{package} {candidate} needs Java 8, provisioning it");
    for command in prerequisite.source.commands() {
        host.run(&command)?;
    }
    Ok(true)
}

/// Mode-dependent package preparation: clears conflicts, registers the
/// repository, provisions prerequisites and refreshes the system. Returns the
/// packages to install.
pub fn setup_packages(
    host: &dyn Host,
    software: &SoftwareManager,
    descriptor: &Descriptor,
    mode: &InstallMode,
    sw_repo: Option<&str>,
) -> Result<Vec<String>, SanityError> {
    for package in descriptor.conflicts {
        if !software.remove(host, package)? {
            debug!("{package} was not removed");
        }
    }

    let plan = resolve_packages(descriptor, mode, sw_repo)?;
    register_repository(host, &plan.source, descriptor.repo_destination)?;

    if let Some(primary) = plan.packages.first() {
        provision_prerequisites(host, descriptor, mode, primary)?;
    }

    if !software.upgrade(host, None)? {
        warn!("Upgrade after registering {} failed, continuing", plan.source);
    }
    Ok(plan.packages)
}
