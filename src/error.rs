//! Error handling for artifact-sanity.
use std::time::Duration;

use thiserror::Error;

use crate::verify::CheckKind;

/// Defines every terminal cause an orchestration run can report.
#[derive(Debug, Error)]
pub enum SanityError {
    /// No installer variant is registered for the detected platform.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The host's package-management tooling has no matching backend.
    #[error("Unimplemented package management system: {0}")]
    UnsupportedPackageManager(String),

    /// A required package failed to install.
    #[error("Package {package} could not be installed (see logs for details)")]
    InstallPackage {
        /// Base name of the package that failed.
        package: String,
    },

    /// Post-install scriptlets failed for one or more packages during the run.
    #[error("RPM scriptlet failure reported for package(s): {}", packages.join(","))]
    ScriptletFailure {
        /// Every package recorded by the inspector, in observation order.
        packages: Vec<String>,
    },

    /// A unit was not active after the group was started.
    #[error("Failed to start service {service} (see logs for details)")]
    StartService {
        /// The unit that did not come up.
        service: String,
    },

    /// A unit was still active after the group was stopped.
    #[error("Failed to stop service {service} (see logs for details)")]
    StopService {
        /// The unit that did not go down.
        service: String,
    },

    /// A unit was not active after the group was restarted.
    #[error("Failed to restart service {service} (see logs for details)")]
    RestartService {
        /// The unit that did not come back.
        service: String,
    },

    /// The readiness predicate never held within the bound.
    #[error("Scylla service does not appear to be up after {} s", timeout.as_secs())]
    ReadinessTimeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// A post-install assertion failed.
    #[error("Verification '{check}' failed: {message}")]
    Verification {
        /// The check that failed.
        check: CheckKind,
        /// Observed versus expected state.
        message: String,
    },

    /// The load generator reported an I/O exception.
    #[error("cassandra-stress: {0}")]
    Workload(String),

    /// A required helper command failed outright.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A version string could not be interpreted.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Error reading or interpreting the configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for the command execution primitive.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be spawned or waited on.
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        /// The rendered command line.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    NonZeroExit {
        /// The rendered command line.
        command: String,
        /// Exit code reported by the process (-1 when killed by a signal).
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The process outlived its timeout and was killed.
    #[error("Command `{command}` timed out after {timeout:?}")]
    TimedOut {
        /// The rendered command line.
        command: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// A required executable is not on `PATH`.
    #[error("Command not found: {0}")]
    NotFound(String),

    /// An outbound HTTP request failed.
    #[error("HTTP request to {url} failed: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport or status failure description.
        message: String,
    },
}

/// Error type for version parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    /// The string has no leading numeric release.
    #[error("Invalid version string: '{0}'")]
    Invalid(String),

    /// The expected pattern was not present in command output.
    #[error("No version matching /{pattern}/ in output")]
    NotFound {
        /// The regular expression that was searched for.
        pattern: String,
    },
}
