//! Constants and fixed host paths used by the installer and verification pass.
//!
//! This module centralizes the product names, filesystem contracts, and timing
//! bounds so that the installer variants and checks agree on them.

use std::time::Duration;

// ============================================================================
// Product
// ============================================================================

/// Name of the product and of the system user that owns its data.
pub const PRODUCT: &str = "scylla";

/// Service units managed as one group, in start order.
pub const SERVICE_UNITS: [&str; 2] = ["scylla-server", "scylla-jmx"];

/// Client-facing CQL port. The group is ready once this port is occupied.
pub const CQL_PORT: u16 = 9042;

/// Units followed by the diagnostics log tail.
pub const JOURNAL_UNITS: [&str; 3] = [
    "scylla-io-setup.service",
    "scylla-server.service",
    "scylla-jmx.service",
];

/// Metrics collector unit checked alongside the server.
pub const COLLECTOR_UNIT: &str = "collectd";

// ============================================================================
// File System Contracts
// ============================================================================

/// Data directory that becomes a RAID mount point when a second disk exists.
pub const DATA_DIR: &str = "/var/lib/scylla";

/// Where coredumps must land once the data volume is configured.
pub const DATA_COREDUMP_DIR: &str = "/var/lib/scylla/coredump";

/// systemd's coredump storage directory.
pub const SYSTEMD_COREDUMP_DIR: &str = "/var/lib/systemd/coredump";

/// Host setup script shipped by the package.
pub const SETUP_SCRIPT: &str = "/usr/lib/scylla/scylla_setup";

/// Flag the setup script advertises when CPU scaling setup can be skipped.
pub const NO_CPUSCALING_FLAG: &str = "--no-cpuscaling-setup";

/// Monitoring agent binary.
pub const NODE_EXPORTER: &str = "/usr/bin/node_exporter";

/// Repository descriptor destination on Debian-family hosts.
pub const APT_REPO_DST: &str = "/etc/apt/sources.list.d/scylla.list";

/// Repository descriptor destination on Red Hat-family hosts.
pub const YUM_REPO_DST: &str = "/etc/yum.repos.d/scylla.repo";

/// Housekeeping identifier generated by the product on first start.
pub const HOUSEKEEPING_UUID: &str = "/var/lib/scylla-housekeeping/housekeeping.uuid";

/// Marker written once the housekeeping identifier has been reported.
pub const HOUSEKEEPING_MARK: &str = "/var/lib/scylla-housekeeping/housekeeping.uuid.marked";

/// Name of the sentinel written after the first successful setup.
pub const SETUP_DONE_FILE: &str = "scylla-setup-done";

/// Default directory holding the setup sentinel.
pub const DEFAULT_STATE_DIR: &str = "/var/tmp/artifact-sanity";

/// Glob listing candidate secondary block devices.
pub const SECONDARY_DISK_GLOB: &str = "/dev/[hvs]db";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "artifact-sanity.yaml";

// ============================================================================
// External Endpoints
// ============================================================================

/// Endpoint receiving the housekeeping identifier.
pub const DEFAULT_REPORT_URL: &str =
    "https://i6a5h9l1kl.execute-api.us-east-1.amazonaws.com/prod/check_version";

/// Instance metadata service root.
pub const METADATA_URL: &str = "http://169.254.169.254/latest/meta-data";

// ============================================================================
// Timing
// ============================================================================

/// Interval between package index refresh attempts.
pub const INDEX_REFRESH_STEP: Duration = Duration::from_secs(30);

/// Total bound for package index refresh and system upgrade.
pub const INDEX_REFRESH_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between readiness probes.
pub const READINESS_STEP: Duration = Duration::from_secs(5);

/// Total bound for the service group to accept clients.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(900);

/// Interval between checks for the housekeeping identifier.
pub const UUID_WAIT_STEP: Duration = Duration::from_secs(5);

/// Total bound for the housekeeping identifier to appear.
pub const UUID_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the cassandra-stress populate pass.
pub const STRESS_POPULATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for the cassandra-stress mixed pass.
pub const STRESS_MIXED_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Markers
// ============================================================================

/// Output pattern emitted by rpm when a product package's scriptlet fails.
pub const SCRIPTLET_FAILURE_PATTERN: &str = r"scriptlet failure in rpm package scylla.*";

/// Line fragment that marks a failed load-generation pass.
pub const STRESS_FAILURE_MARKER: &str = "java.io.IOException";
