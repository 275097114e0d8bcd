//! Client-side smoke workload run after every lifecycle step.
use std::{path::PathBuf, time::Duration};

use tracing::info;

use crate::{
    constants::STRESS_FAILURE_MARKER,
    error::{CommandError, SanityError},
    host::{CommandOutput, Host, Invocation},
};

/// Runs `nodetool status` and two `cassandra-stress` passes against the
/// local node.
pub struct Workload<'a> {
    host: &'a dyn Host,
    populate_timeout: Duration,
    mixed_timeout: Duration,
}

impl<'a> Workload<'a> {
    pub fn new(host: &'a dyn Host, populate_timeout: Duration, mixed_timeout: Duration) -> Self {
        Self {
            host,
            populate_timeout,
            mixed_timeout,
        }
    }

    fn locate(&self, name: &str) -> Result<PathBuf, SanityError> {
        self.host
            .find_command(name)
            .ok_or_else(|| CommandError::NotFound(name.to_string()).into())
    }

    pub fn nodetool_status(&self) -> Result<(), SanityError> {
        let nodetool = self.locate("nodetool")?;
        let output = self
            .host
            .run(&Invocation::new(format!("{} status", nodetool.display())))?;
        info!("nodetool status:\n{}", output.stdout.trim_end());
        Ok(())
    }

    pub fn cassandra_stress(&self) -> Result<(), SanityError> {
        let stress = self.locate("cassandra-stress")?;
        let stress = stress.display();

        let populate = Invocation::new(format!(
            "{stress} write n=10000 -mode cql3 native -pop seq=1..10000"
        ))
        .timeout(self.populate_timeout);
        check_output(&self.host.run(&populate)?)?;

        let mixed = Invocation::new(format!(
            "{stress} mixed duration=1m -mode cql3 native -rate threads=10 -pop seq=1..10000"
        ))
        .shell()
        .timeout(self.mixed_timeout);
        check_output(&self.host.run(&mixed)?)?;

        info!("cassandra-stress completed");
        Ok(())
    }

    pub fn run(&self) -> Result<(), SanityError> {
        self.nodetool_status()?;
        self.cassandra_stress()
    }
}

/// Fails on the first output line reporting an I/O exception.
fn check_output(output: &CommandOutput) -> Result<(), SanityError> {
    match output
        .combined()
        .lines()
        .find(|line| line.contains(STRESS_FAILURE_MARKER))
    {
        Some(line) => Err(SanityError::Workload(line.trim().to_string())),
        None => Ok(()),
    }
}
