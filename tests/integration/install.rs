#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use artifact_sanity::{
    constants::{APT_REPO_DST, DATA_DIR, HOUSEKEEPING_MARK, YUM_REPO_DST},
    error::SanityError,
    host::CommandOutput,
    installer::Platform,
    verify::{CheckKind, CheckStatus},
};
use common::{LIST, REPO, STATE_DIR, UUID, centos_host, centos_settings, count, sanity};

#[test]
fn centos_with_secondary_disk_installs_and_verifies() {
    let host = Arc::new(centos_host().with_secondary_disk("/dev/xvdb"));
    let mut sanity = sanity(&host, centos_settings());

    let report = sanity.install_and_verify().expect("install should pass");

    assert!(report.passed());
    assert_eq!(
        report.outcome(CheckKind::DataMount).map(|o| &o.status),
        Some(&CheckStatus::Passed)
    );
    assert!(host.mounted(DATA_DIR));
    assert!(host.ran("--nic eth0 --disks /dev/xvdb --no-node-exporter --no-cpuscaling-setup"));
    assert_eq!(host.file(YUM_REPO_DST).as_deref(), Some(&*format!("# {REPO}\n")));
    assert_eq!(count(&host, "yum -y install scylla"), 1);
    assert!(host.ran("cassandra-stress mixed duration=1m"));
    assert!(sanity.failures().is_empty());
    assert!(sanity.is_setup_done());
}

#[test]
fn identifier_is_reported_once_with_marker() {
    let host = Arc::new(centos_host());
    let mut sanity = sanity(&host, centos_settings());
    sanity.install_and_verify().unwrap();

    let requests = host.http_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].ends_with(&format!("?uu={UUID}&mark=scylla")));
    assert!(host.file(HOUSEKEEPING_MARK).is_some());
}

#[test]
fn scriptlet_failure_fails_the_run_after_install_completes() {
    let host = Arc::new(centos_host().respond(
        "yum -y install scylla",
        CommandOutput::success(
            "Installing : scylla-server-2.1.0-1.el7.x86_64\nwarning: %post(scylla-server) scriptlet failed, exit status 1\nscriptlet failure in rpm package scylla-server\nComplete!\n",
        ),
    ));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.install_and_verify().unwrap_err();

    match &err {
        SanityError::ScriptletFailure { packages } => assert_eq!(packages, &["scylla-server"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("scylla-server"));
    assert!(sanity.is_setup_done());
    assert!(host.ran("cassandra-stress mixed"));
}

#[test]
fn host_without_secondary_disk_skips_raid_and_mount_check() {
    let host = Arc::new(centos_host());
    let mut sanity = sanity(&host, centos_settings());

    let report = sanity.install_and_verify().unwrap();

    assert!(host.ran("--nic eth0 --no-raid-setup"));
    assert!(!host.ran("--disks"));
    assert!(!host.mounted(DATA_DIR));
    assert!(matches!(
        report.outcome(CheckKind::DataMount).map(|o| &o.status),
        Some(CheckStatus::Skipped(_))
    ));
}

#[test]
fn failed_package_install_is_reported_by_name() {
    let host = Arc::new(centos_host().respond(
        "yum -y install scylla",
        CommandOutput::failure(1, "No package scylla available.\n"),
    ));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.install_and_verify().unwrap_err();

    assert!(matches!(err, SanityError::InstallPackage { ref package } if package == "scylla"));
    assert!(!sanity.is_setup_done());
    assert!(!host.ran("scylla_setup"));
}

#[test]
fn setup_runs_once_per_host() {
    let host = Arc::new(centos_host());
    let mut sanity = sanity(&host, centos_settings());
    sanity.install_and_verify().unwrap();

    let report = sanity.install_and_verify().unwrap();

    assert_eq!(count(&host, "yum -y install scylla"), 1);
    assert!(report.outcome(CheckKind::SecurityPolicy).is_none());
    assert_eq!(
        report.outcome(CheckKind::ServiceHealth).map(|o| &o.status),
        Some(&CheckStatus::Passed)
    );
    assert_eq!(
        host.file(format!("{STATE_DIR}/scylla-setup-done")).as_deref(),
        Some("")
    );
}

#[test]
fn enforcing_selinux_keeps_the_host_unmarked() {
    let host = Arc::new(centos_host().respond("getenforce", CommandOutput::success("Enforcing\n")));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.install_and_verify().unwrap_err();

    assert!(matches!(
        err,
        SanityError::Verification {
            check: CheckKind::SecurityPolicy,
            ..
        }
    ));
    assert!(!sanity.is_setup_done());
    assert!(!host.ran("cassandra-stress"));
}

#[test]
fn unsupported_platform_touches_nothing() {
    let host = Arc::new(centos_host());
    let mut settings = centos_settings();
    settings.platform = Some(Platform::new("ubuntu", "18", "04"));
    let mut sanity = sanity(&host, settings);

    let err = sanity.install_and_verify().unwrap_err();

    assert!(matches!(err, SanityError::UnsupportedPlatform(ref name) if name == "ubuntu 18.04"));
    assert!(!host.ran("yum"));
}

#[test]
fn missing_repository_descriptor_is_a_config_error() {
    let host = Arc::new(centos_host());
    let mut settings = centos_settings();
    settings.sw_repo = None;
    let mut sanity = sanity(&host, settings);

    assert!(matches!(
        sanity.install_and_verify(),
        Err(SanityError::Config(_))
    ));
    assert!(!host.ran("yum -y install"));
}

#[test]
fn ubuntu_trusty_provisions_java_before_installing() {
    let host = Arc::new(common::ubuntu_host());
    let mut sanity = sanity(
        &host,
        common::settings(Platform::new("ubuntu", "14", "04"), LIST),
    );

    let report = sanity.install_and_verify().unwrap();

    assert!(matches!(
        report.outcome(CheckKind::SecurityPolicy).map(|o| &o.status),
        Some(CheckStatus::Skipped(_))
    ));
    assert_eq!(host.file(APT_REPO_DST).as_deref(), Some(&*format!("# {LIST}\n")));

    let executed = host.executed();
    let java = executed
        .iter()
        .position(|cmd| cmd.contains("openjdk-8-jre-headless"))
        .expect("java provisioned");
    let install = executed
        .iter()
        .position(|cmd| cmd == "apt-get -y install scylla")
        .expect("scylla installed");
    assert!(java < install);
    assert!(host.ran("service ntp status"));
}
