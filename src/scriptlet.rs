//! Detection of package scriptlet failures hidden behind a successful exit code.
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::{constants::SCRIPTLET_FAILURE_PATTERN, host::CommandOutput};

fn failure_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SCRIPTLET_FAILURE_PATTERN).expect("valid scriptlet regex"))
}

/// Append-only record of packages whose scriptlets failed during this run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptletFailures {
    packages: Vec<String>,
}

impl ScriptletFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans stdout and stderr for failure markers, recording one package per
    /// occurrence. Output without a marker leaves the record untouched.
    pub fn inspect(&mut self, result: &CommandOutput) {
        let output = result.combined();
        for occurrence in failure_regex().find_iter(&output) {
            if let Some(package) = occurrence.as_str().split_whitespace().last() {
                warn!("Scriptlet failure detected for package {package}");
                self.packages.push(package.to_string());
            }
        }
    }

    /// Records a failure observed by an earlier run on the same host.
    pub fn record(&mut self, package: impl Into<String>) {
        self.packages.push(package.into());
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }
}
