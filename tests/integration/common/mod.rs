#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use artifact_sanity::{
    config::Settings,
    constants::{NO_CPUSCALING_FLAG, NODE_EXPORTER, SETUP_SCRIPT},
    installer::Platform,
    mock::MockHost,
    sanity::ArtifactSanity,
    wait::Poll,
};

pub const REPO: &str = "http://downloads.example.com/rpm/centos/scylla.repo";
pub const LIST: &str = "http://downloads.example.com/deb/ubuntu/scylla.list";
pub const UUID: &str = "4f1e3c52-8d0b-4a8e-9a61-2b7c0d9e5f13";
pub const STATE_DIR: &str = "/var/tmp/artifact-sanity-it";

pub fn quick() -> Poll {
    Poll::new(Duration::from_millis(1), Duration::from_millis(50))
}

/// Host with the product tooling and setup script already on disk.
fn tooled(host: MockHost) -> MockHost {
    host.with_command("nodetool")
        .with_command("cassandra-stress")
        .with_file(
            SETUP_SCRIPT,
            &format!("#!/usr/bin/python3\n# parser.add_argument('{NO_CPUSCALING_FLAG}')\n"),
        )
        .with_file(NODE_EXPORTER, "")
        .with_housekeeping_uuid(UUID)
}

pub fn centos_host() -> MockHost {
    tooled(MockHost::new().with_command("yum"))
}

pub fn ubuntu_host() -> MockHost {
    tooled(MockHost::new().with_command("apt-get"))
}

pub fn settings(platform: Platform, sw_repo: &str) -> Settings {
    let mut settings = Settings::default();
    settings.platform = Some(platform);
    settings.sw_repo = Some(sw_repo.to_string());
    settings.state_dir = STATE_DIR.into();
    settings.timing.index_refresh = quick();
    settings.timing.readiness = quick();
    settings.timing.uuid_wait = quick();
    settings.timing.stress_populate = Duration::from_secs(5);
    settings.timing.stress_mixed = Duration::from_secs(5);
    settings
}

pub fn centos_settings() -> Settings {
    settings(Platform::new("centos", "7", "3"), REPO)
}

pub fn sanity(host: &Arc<MockHost>, settings: Settings) -> ArtifactSanity {
    ArtifactSanity::new(host.clone(), settings)
}

/// How many executed commands equal `command` exactly.
pub fn count(host: &MockHost, command: &str) -> usize {
    host.executed().iter().filter(|cmd| *cmd == command).count()
}
