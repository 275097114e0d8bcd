//! Validation of a preinstalled cloud image.
use std::path::Path;

use regex::{Captures, Regex};
use tracing::info;

use super::report_identifier;
use crate::{
    config::Settings,
    constants::METADATA_URL,
    error::SanityError,
    host::{Host, Invocation},
    service::ServiceManager,
    verify::{CheckKind, VerificationOutcome, VerificationReport, log_report},
    version::{self, Version},
};

/// Majors at or above this number are enterprise builds (`2017.1`, ...).
const ENTERPRISE_MAJOR: u64 = 2000;

const ENTERPRISE_AFFINITY_GATE: &str = "2017.666";
const OSS_AFFINITY_GATE: &str = "2.0";

/// Affinity mask every NIC interrupt must carry on the largest i3 size.
const SINGLE_CPU_MASK: &str = "00000000,00000000,00000000,00000001";

fn first_capture<'t>(pattern: &str, text: &'t str) -> Option<Captures<'t>> {
    Regex::new(pattern).ok()?.captures(text)
}

/// EC2 instance type, split into family and size (`i3` and `16xlarge`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceType {
    pub family: String,
    pub size: String,
}

impl InstanceType {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (family, size) = raw.split_once('.').unwrap_or((raw, ""));
        Self {
            family: family.to_string(),
            size: size.to_string(),
        }
    }

    /// Network driver that enhanced networking uses on this instance type.
    pub fn expected_driver(&self) -> Option<&'static str> {
        match (self.family.as_str(), self.size.as_str()) {
            ("i3" | "p2" | "r4" | "x1", _) | ("m4", "16xlarge") => Some("ena"),
            ("c3" | "c4" | "d2" | "i2" | "r3" | "m4", _) => Some("ixgbevf"),
            _ => None,
        }
    }

    fn is_largest(&self) -> bool {
        self.size == "16xlarge"
    }
}

/// Checks the image's networking and CPU pinning, then waits for the
/// preinstalled services.
pub struct AmiValidator<'a> {
    host: &'a dyn Host,
}

impl<'a> AmiValidator<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    pub fn run(
        &self,
        services: &ServiceManager,
        settings: &Settings,
    ) -> Result<VerificationReport, SanityError> {
        info!("Testing AMI, checking that the database is up");
        let instance = self.instance_type()?;

        let report = VerificationReport::new(vec![
            self.enhanced_networking(&instance),
            self.cpu_affinity(&instance)?,
        ]);
        log_report(&report);
        if !report.passed() {
            return Ok(report);
        }

        services.wait_services_up()?;
        report_identifier(self.host, settings)?;
        Ok(report)
    }

    fn instance_type(&self) -> Result<InstanceType, SanityError> {
        let raw = self
            .host
            .http_get(&format!("{METADATA_URL}/instance-type"))?;
        Ok(InstanceType::parse(&raw))
    }

    fn read(&self, path: &str) -> Result<String, String> {
        self.host
            .read_to_string(Path::new(path))
            .map_err(|err| format!("{path}: {err}"))
    }

    pub fn enhanced_networking(&self, instance: &InstanceType) -> VerificationOutcome {
        let Some(expected) = instance.expected_driver() else {
            info!(
                "The instance ({}.{}) doesn't support enhanced networking",
                instance.family, instance.size
            );
            return VerificationOutcome::skipped(
                CheckKind::EnhancedNetworking,
                "instance type without enhanced networking",
            );
        };
        VerificationOutcome::from_result(CheckKind::EnhancedNetworking, self.check_driver(expected))
    }

    fn check_driver(&self, expected: &str) -> Result<(), String> {
        let mac = self.read("/sys/class/net/eth0/address")?;
        let interface = self
            .host
            .http_get(&format!(
                "{METADATA_URL}/network/interfaces/macs/{}/",
                mac.trim()
            ))
            .map_err(|err| err.to_string())?;
        if !interface.contains("vpc-id") {
            return Err(format!("VPC is not enabled! debug: {interface}"));
        }

        let ethtool = self
            .host
            .run(&Invocation::new("ethtool -i eth0"))
            .map_err(|err| err.to_string())?;
        let used = first_capture(r"(?m)^driver:\s(.*)$", &ethtool.stdout)
            .map(|caps| caps[1].trim().to_string())
            .ok_or_else(|| format!("ethtool reported no driver: {}", ethtool.stdout.trim()))?;
        if used != expected {
            return Err(format!(
                "Enhanced networking isn't enabled, current driver: {used}, expected: {expected}"
            ));
        }
        info!("Enhanced networking is enabled, current driver: {used}");
        Ok(())
    }

    /// Older builds pin I/O queues and NIC interrupts on i3 instances.
    pub fn cpu_affinity(&self, instance: &InstanceType) -> Result<VerificationOutcome, SanityError> {
        let output = self.host.run(&Invocation::new("scylla --version"))?;
        let installed = Version::extract(r"(\d+\.\d+)", &output.stdout)?;
        let gate = if installed.major() >= ENTERPRISE_MAJOR {
            ENTERPRISE_AFFINITY_GATE
        } else {
            OSS_AFFINITY_GATE
        };

        if instance.family != "i3" || version::meets(&installed, gate)? {
            return Ok(VerificationOutcome::skipped(
                CheckKind::CpuAffinity,
                "affinity is only pinned on i3 below the gate",
            ));
        }
        Ok(VerificationOutcome::from_result(
            CheckKind::CpuAffinity,
            self.check_affinity(instance),
        ))
    }

    /// Non-comment lines of a configuration file.
    fn settings_lines(&self, path: &str) -> Result<String, String> {
        let raw = self.read(path)?;
        let joined = raw
            .lines()
            .filter(|line| !line.contains('#'))
            .collect::<Vec<_>>()
            .join("\n");
        if joined.trim().is_empty() {
            return Err(format!("{path} has no settings"));
        }
        Ok(joined)
    }

    fn check_affinity(&self, instance: &InstanceType) -> Result<(), String> {
        let io = self.settings_lines("/etc/scylla.d/io.conf")?;
        let queues: u64 = first_capture(r"--num-io-queues\s+(\d+)", &io)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or("io.conf doesn't set --num-io-queues")?;

        let cpuset = self.settings_lines("/etc/scylla.d/cpuset.conf")?;
        let (start, end): (u64, u64) = first_capture(r"--cpuset\s+(\d+)-(\d+)", &cpuset)
            .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
            .ok_or("cpuset.conf doesn't set a --cpuset range")?;

        if !instance.is_largest() && (start != 0 || end + 1 != queues) {
            return Err(format!(
                "cpuset {start}-{end} doesn't match {queues} io queues"
            ));
        }

        let interrupts = self.read("/proc/interrupts")?;
        let irq_re = Regex::new(r"^\s*(\d+):").map_err(|err| err.to_string())?;
        let mut seen: Vec<String> = Vec::new();
        for line in interrupts.lines().filter(|line| line.contains("eth")) {
            let Some(caps) = irq_re.captures(line) else {
                continue;
            };
            let irq = &caps[1];
            let affinity = self.read(&format!("/proc/irq/{irq}/smp_affinity"))?;
            let affinity = affinity.trim().to_string();

            if instance.is_largest() {
                if affinity != SINGLE_CPU_MASK {
                    return Err(format!(
                        "irq {irq} has affinity {affinity}, expected {SINGLE_CPU_MASK}"
                    ));
                }
            } else if seen.contains(&affinity) {
                return Err(format!(
                    "smp affinity of different interrupts should be different (irq {irq} repeats {affinity})"
                ));
            }
            seen.push(affinity);
        }
        Ok(())
    }
}
