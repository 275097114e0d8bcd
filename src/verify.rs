//! Post-install assertions about the host configuration.
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tracing::{info, warn};

use crate::{
    constants::{
        COLLECTOR_UNIT, DATA_COREDUMP_DIR, DATA_DIR, NODE_EXPORTER, SYSTEMD_COREDUMP_DIR,
    },
    error::SanityError,
    host::{Host, InitSystem, Invocation},
    installer::Family,
};

/// Identifies a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    SecurityPolicy,
    MonitoringAgent,
    DataMount,
    TimeSync,
    Coredump,
    ServiceHealth,
    EnhancedNetworking,
    CpuAffinity,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed(String),
    /// The check does not apply to this host.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    pub check: CheckKind,
    #[serde(flatten)]
    pub status: CheckStatus,
}

impl VerificationOutcome {
    pub(crate) fn from_result(check: CheckKind, result: Result<(), String>) -> Self {
        let status = match result {
            Ok(()) => CheckStatus::Passed,
            Err(message) => CheckStatus::Failed(message),
        };
        Self { check, status }
    }

    pub(crate) fn skipped(check: CheckKind, reason: &str) -> Self {
        Self {
            check,
            status: CheckStatus::Skipped(reason.to_string()),
        }
    }
}

/// Every outcome of one verification pass, in check order.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub generated_at: DateTime<Utc>,
    pub outcomes: Vec<VerificationOutcome>,
}

impl VerificationReport {
    pub fn new(outcomes: Vec<VerificationOutcome>) -> Self {
        Self {
            generated_at: Utc::now(),
            outcomes,
        }
    }

    pub fn passed(&self) -> bool {
        self.first_failure().is_none()
    }

    pub fn outcome(&self, check: CheckKind) -> Option<&VerificationOutcome> {
        self.outcomes.iter().find(|outcome| outcome.check == check)
    }

    fn first_failure(&self) -> Option<(CheckKind, &str)> {
        self.outcomes.iter().find_map(|outcome| match &outcome.status {
            CheckStatus::Failed(message) => Some((outcome.check, message.as_str())),
            _ => None,
        })
    }

    /// Converts the report into its first failure, if any.
    pub fn into_result(self) -> Result<(), SanityError> {
        match self.first_failure() {
            Some((check, message)) => Err(SanityError::Verification {
                check,
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// What the checks need to know about the host.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    pub family: Family,
    /// Lower-cased distribution name.
    pub distro: String,
    pub init: InitSystem,
    /// Secondary block device the data volume was built on, if any.
    pub secondary_device: Option<String>,
}

/// Runs the post-install checks against a host.
pub struct Verifier<'a> {
    host: &'a dyn Host,
    ctx: &'a VerifyContext,
}

impl<'a> Verifier<'a> {
    pub fn new(host: &'a dyn Host, ctx: &'a VerifyContext) -> Self {
        Self { host, ctx }
    }

    /// Runs every check after installation.
    pub fn full(&self) -> VerificationReport {
        let report = VerificationReport::new(vec![
            self.security_policy(),
            self.monitoring_agent(),
            self.data_mount(),
            self.time_sync(),
            self.coredump(),
            self.service_health(),
        ]);
        log_report(&report);
        report
    }

    /// Runs the checks that must keep holding after a lifecycle transition.
    pub fn post_transition(&self) -> VerificationReport {
        let report = VerificationReport::new(vec![self.service_health()]);
        log_report(&report);
        report
    }

    fn run_stdout(&self, command: &str) -> Result<String, String> {
        self.host
            .run(&Invocation::new(command))
            .map(|output| output.stdout)
            .map_err(|err| err.to_string())
    }

    fn security_policy(&self) -> VerificationOutcome {
        if self.ctx.family == Family::Debian {
            return VerificationOutcome::skipped(CheckKind::SecurityPolicy, "no SELinux on Debian family");
        }
        let result = self.run_stdout("getenforce").and_then(|stdout| {
            if stdout.contains("Enforcing") {
                Err("SELinux is still actived (expected Permissive or Disabled, found Enforcing)".to_string())
            } else {
                Ok(())
            }
        });
        VerificationOutcome::from_result(CheckKind::SecurityPolicy, result)
    }

    fn monitoring_agent(&self) -> VerificationOutcome {
        let result = if self.host.exists(Path::new(NODE_EXPORTER)) {
            Ok(())
        } else {
            Err(format!("node_exporter isn't installed ({NODE_EXPORTER} missing)"))
        };
        VerificationOutcome::from_result(CheckKind::MonitoringAgent, result)
    }

    fn data_mount(&self) -> VerificationOutcome {
        let Some(device) = &self.ctx.secondary_device else {
            return VerificationOutcome::skipped(CheckKind::DataMount, "no secondary disk");
        };
        let result = if self.host.is_mount_point(Path::new(DATA_DIR)) {
            Ok(())
        } else {
            Err(format!(
                "RAID setup failed, {DATA_DIR} isn't mounted rightly (expected a mount on {device})"
            ))
        };
        VerificationOutcome::from_result(CheckKind::DataMount, result)
    }

    fn time_sync(&self) -> VerificationOutcome {
        let command = match self.ctx.family {
            Family::Debian => "service ntp status",
            Family::RedHat => "systemctl status ntpd",
        };
        let result = self.run_stdout(command).map(|_| ());
        VerificationOutcome::from_result(CheckKind::TimeSync, result)
    }

    fn coredump(&self) -> VerificationOutcome {
        let result = if self.ctx.init.is_systemd() && !self.ctx.distro.contains("debian") {
            self.systemd_coredump()
        } else {
            self.run_stdout("sysctl kernel.core_pattern").and_then(|stdout| {
                if stdout.contains("scylla_save_coredump") {
                    Ok(())
                } else {
                    Err(format!(
                        "kernel.core_pattern doesn't use scylla_save_coredump: {}",
                        stdout.trim()
                    ))
                }
            })
        };
        VerificationOutcome::from_result(CheckKind::Coredump, result)
    }

    fn systemd_coredump(&self) -> Result<(), String> {
        let output = self
            .host
            .run(&Invocation::new("coredumpctl info").ignore_status())
            .map_err(|err| err.to_string())?;
        let reported = output.stderr.trim();
        if reported != "No coredumps found." {
            return Err(format!(
                "Coredump info doesn't work (expected 'No coredumps found.', got '{reported}')"
            ));
        }

        if self.ctx.secondary_device.is_some() {
            let resolved = self
                .host
                .canonicalize(Path::new(SYSTEMD_COREDUMP_DIR))
                .map_err(|err| format!("{SYSTEMD_COREDUMP_DIR}: {err}"))?;
            if resolved != Path::new(DATA_COREDUMP_DIR) {
                return Err(format!(
                    "Coredump directory isn't pointed to raid disk (expected {DATA_COREDUMP_DIR}, found {})",
                    resolved.display()
                ));
            }
        }
        Ok(())
    }

    fn service_health(&self) -> VerificationOutcome {
        let result = ["scylla-server", COLLECTOR_UNIT]
            .iter()
            .try_for_each(|unit| match self.ctx.init {
                InitSystem::Systemd => self.run_stdout(&format!("systemctl status {unit}")).map(|_| ()),
                InitSystem::SysV => {
                    let stdout = self.run_stdout(&format!("service {unit} status"))?;
                    if stdout.contains("running") {
                        Ok(())
                    } else {
                        Err(format!("{unit} is not running: {}", stdout.trim()))
                    }
                }
            });
        VerificationOutcome::from_result(CheckKind::ServiceHealth, result)
    }
}

pub(crate) fn log_report(report: &VerificationReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            CheckStatus::Passed => info!("Check {} passed", outcome.check),
            CheckStatus::Skipped(reason) => info!("Check {} skipped: {reason}", outcome.check),
            CheckStatus::Failed(message) => warn!("Check {} failed: {message}", outcome.check),
        }
    }
}
