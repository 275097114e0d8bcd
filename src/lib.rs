//! artifact-sanity installs a freshly built Scylla package on a target
//! operating system image, brings its services up and checks that the host
//! ends in the expected configuration (security policy, disk layout, coredump
//! capture, monitoring agent). It is meant as an acceptance gate in CI
//! pipelines that publish distribution packages.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Product names, host paths and timing bounds.
pub mod constants;

/// Error handling.
pub mod error;

/// Command execution and host probes.
pub mod host;

/// Installer variant selection and the install procedure.
pub mod installer;

/// Product log forwarding.
pub mod logs;

/// Simulated host for tests.
pub mod mock;

/// Package-management backends.
pub mod packages;

/// Orchestration entry points.
pub mod sanity;

/// Scriptlet failure detection.
pub mod scriptlet;

/// Service group lifecycle.
pub mod service;

/// Post-install verification.
pub mod verify;

/// Version ordering.
pub mod version;

/// Bounded-wait polling.
pub mod wait;

/// Client workload checks.
pub mod workload;
