#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use artifact_sanity::{
    config::Settings,
    error::SanityError,
    host::CommandOutput,
    mock::MockHost,
    verify::{CheckKind, CheckStatus},
};
use common::{UUID, centos_host, centos_settings, sanity};

const MAC: &str = "06:5a:1c:9e:44:21";

fn image(instance_type: &str, driver: &str, version: &str) -> MockHost {
    centos_host()
        .with_unit_state("scylla-server", true)
        .with_unit_state("scylla-jmx", true)
        .respond_http("instance-type", instance_type)
        .respond_http(&format!("macs/{MAC}/"), "device-number\nmac\nvpc-id\n")
        .with_file("/sys/class/net/eth0/address", &format!("{MAC}\n"))
        .respond(
            "ethtool -i eth0",
            CommandOutput::success(format!("driver: {driver}\nversion: 4.0.0\nbus-info: 0000:00:03.0\n")),
        )
        .respond("scylla --version", CommandOutput::success(format!("{version}\n")))
}

fn ami_settings() -> Settings {
    let mut settings = centos_settings();
    settings.ami = true;
    settings.sw_repo = None;
    settings
}

#[test]
fn current_image_passes_without_installing() {
    let host = Arc::new(image("i3.large", "ena", "2.1.3-0.20180101.abcdef"));
    let mut sanity = sanity(&host, ami_settings());

    let report = sanity.install_and_verify().unwrap();

    assert_eq!(
        report.outcome(CheckKind::EnhancedNetworking).map(|o| &o.status),
        Some(&CheckStatus::Passed)
    );
    assert!(matches!(
        report.outcome(CheckKind::CpuAffinity).map(|o| &o.status),
        Some(CheckStatus::Skipped(_))
    ));
    assert!(!host.ran("yum"));
    assert!(!host.ran("scylla_setup"));
    assert!(host.http_requests().iter().any(|url| url.contains(UUID)));
    assert!(sanity.is_setup_done());
}

#[test]
fn wrong_driver_fails_before_waiting_for_services() {
    let host = Arc::new(image("c4.xlarge", "vif", "2.1.3").with_port_blocked());
    let mut sanity = sanity(&host, ami_settings());

    let err = sanity.install_and_verify().unwrap_err();

    match err {
        SanityError::Verification { check, message } => {
            assert_eq!(check, CheckKind::EnhancedNetworking);
            assert!(message.contains("expected: ixgbevf"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!sanity.is_setup_done());
}

#[test]
fn old_i3_image_checks_interrupt_affinity() {
    let host = Arc::new(
        image("i3.2xlarge", "ena", "1.7.4")
            .with_file("/etc/scylla.d/io.conf", "SEASTAR_IO=\"--num-io-queues 2 --max-io-requests 64\"\n")
            .with_file("/etc/scylla.d/cpuset.conf", "# generated\nCPUSET=\"--cpuset 0-1 \"\n")
            .with_file(
                "/proc/interrupts",
                " 30:   512   0   PCI-MSI  eth0-Tx-Rx-0\n 31:   0   512   PCI-MSI  eth0-Tx-Rx-1\n",
            )
            .with_file("/proc/irq/30/smp_affinity", "00000001\n")
            .with_file("/proc/irq/31/smp_affinity", "00000001\n"),
    );
    let mut sanity = sanity(&host, ami_settings());

    let err = sanity.install_and_verify().unwrap_err();

    assert!(matches!(
        err,
        SanityError::Verification {
            check: CheckKind::CpuAffinity,
            ..
        }
    ));
}

#[test]
fn instances_without_enhanced_networking_are_skipped() {
    let host = Arc::new(image("t2.micro", "vif", "2.1.3"));
    let mut sanity = sanity(&host, ami_settings());

    let report = sanity.install_and_verify().unwrap();

    assert!(matches!(
        report.outcome(CheckKind::EnhancedNetworking).map(|o| &o.status),
        Some(CheckStatus::Skipped(_))
    ));
    assert!(!host.ran("ethtool"));
}
