#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use artifact_sanity::{
    constants::SERVICE_UNITS,
    error::SanityError,
    host::CommandOutput,
    mock::MockHost,
    verify::{CheckKind, CheckStatus},
};
use common::{STATE_DIR, centos_host, centos_settings, count, sanity};

fn position(host: &MockHost, command: &str) -> usize {
    host.executed()
        .iter()
        .position(|cmd| cmd == command)
        .unwrap_or_else(|| panic!("{command} never ran"))
}

/// A host where an earlier run already completed setup.
fn prepared(host: MockHost) -> Arc<MockHost> {
    Arc::new(host.with_file(format!("{STATE_DIR}/scylla-setup-done"), ""))
}

#[test]
fn stop_start_sets_up_first_then_cycles_the_group() {
    let host = Arc::new(centos_host());
    let mut sanity = sanity(&host, centos_settings());

    let report = sanity.stop_start_and_verify().unwrap();

    assert_eq!(count(&host, "yum -y install scylla"), 1);
    assert!(position(&host, "systemctl stop scylla-jmx") < position(&host, "systemctl stop scylla-server"));
    let executed = host.executed();
    let last_start = executed
        .iter()
        .rposition(|cmd| cmd == "systemctl start scylla-server")
        .unwrap();
    assert!(last_start > position(&host, "systemctl stop scylla-server"));
    assert!(host.unit_active("scylla-server") && host.unit_active("scylla-jmx"));
    assert_eq!(
        report.outcome(CheckKind::ServiceHealth).map(|o| &o.status),
        Some(&CheckStatus::Passed)
    );
    assert!(host.ran("cassandra-stress write n=10000"));
}

#[test]
fn restart_on_prepared_host_skips_install() {
    let host = prepared(centos_host());
    let mut sanity = sanity(&host, centos_settings());

    sanity.restart_and_verify().unwrap();

    assert!(!host.ran("yum"));
    assert!(host.ran("systemctl restart scylla-server"));
    assert!(host.ran("systemctl restart scylla-jmx"));
    assert!(host.ran("/usr/bin/nodetool status"));
}

#[test]
fn unit_ignoring_stop_fails_stop_start() {
    let host = prepared(centos_host().with_sticky_unit("scylla-jmx"));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.stop_start_and_verify().unwrap_err();

    assert!(matches!(err, SanityError::StopService { ref service } if service == "scylla-jmx"));
    assert!(!host.ran("systemctl start"));
}

#[test]
fn unit_never_coming_back_fails_restart() {
    let host = prepared(centos_host().with_stuck_unit("scylla-server"));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.restart_and_verify().unwrap_err();

    assert!(matches!(err, SanityError::RestartService { ref service } if service == "scylla-server"));
    assert!(host.ran("journalctl -xe"));
}

#[test]
fn closed_client_port_times_out() {
    let host = prepared(centos_host().with_port_blocked());
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.stop_start_and_verify().unwrap_err();

    assert!(matches!(err, SanityError::ReadinessTimeout { .. }));
    assert!(!host.ran("cassandra-stress"));
}

#[test]
fn sysv_hosts_use_service_scripts() {
    let host = prepared(centos_host().with_sysv_init());
    let mut sanity = sanity(&host, centos_settings());

    sanity.stop_start_and_verify().unwrap();

    assert!(position(&host, "service scylla-jmx stop") < position(&host, "service scylla-server start"));
    assert!(host.ran("service collectd status"));
    assert!(!host.ran("systemctl"));
}

#[test]
fn dead_collector_fails_post_transition_check() {
    let host = prepared(centos_host().with_unit_state("collectd", false));
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.restart_and_verify().unwrap_err();

    assert!(matches!(
        err,
        SanityError::Verification {
            check: CheckKind::ServiceHealth,
            ..
        }
    ));
}

fn scriptlet_host() -> MockHost {
    centos_host().respond(
        "yum -y install scylla",
        CommandOutput::success(
            "Installing : scylla-server-2.1.0-1.el7.x86_64\nscriptlet failure in rpm package scylla-server\nComplete!\n",
        ),
    )
}

fn scriptlet_packages(err: SanityError) -> Vec<String> {
    match err {
        SanityError::ScriptletFailure { packages } => packages,
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stop_start_on_fresh_host_reports_scriptlet_failure() {
    let host = Arc::new(scriptlet_host());
    let mut sanity = sanity(&host, centos_settings());

    let err = sanity.stop_start_and_verify().unwrap_err();

    assert_eq!(scriptlet_packages(err), ["scylla-server"]);
    assert!(sanity.is_setup_done());
    assert!(SERVICE_UNITS.iter().all(|unit| host.unit_active(unit)));
}

#[test]
fn scriptlet_failure_survives_the_setup_sentinel() {
    let host = Arc::new(scriptlet_host());
    assert!(sanity(&host, centos_settings()).restart_and_verify().is_err());
    assert_eq!(
        host.file(format!("{STATE_DIR}/scylla-setup-done")).as_deref(),
        Some("scylla-server\n")
    );

    let err = sanity(&host, centos_settings())
        .install_and_verify()
        .unwrap_err();

    assert_eq!(scriptlet_packages(err), ["scylla-server"]);
    assert_eq!(count(&host, "yum -y install scylla"), 1);
}

#[test]
fn repeated_entry_points_report_each_failure_once() {
    let host = Arc::new(scriptlet_host());
    let mut sanity = sanity(&host, centos_settings());

    assert!(sanity.install_and_verify().is_err());
    assert!(sanity.stop_start_and_verify().is_err());
    let err = sanity.restart_and_verify().unwrap_err();

    assert_eq!(scriptlet_packages(err), ["scylla-server"]);
    assert_eq!(sanity.failures().packages(), ["scylla-server"]);
}

#[test]
fn stop_start_leaves_every_unit_active() {
    let host = prepared(centos_host());
    let mut sanity = sanity(&host, centos_settings());

    sanity.stop_start_and_verify().unwrap();
    assert!(SERVICE_UNITS.iter().all(|unit| host.unit_active(unit)));

    sanity.services().stop_services().unwrap();
    assert!(SERVICE_UNITS.iter().all(|unit| !host.unit_active(unit)));
}
