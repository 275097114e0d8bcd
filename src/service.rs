//! Lifecycle management for the product's service group.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    constants::{CQL_PORT, SERVICE_UNITS},
    error::SanityError,
    host::{Host, InitSystem, Invocation},
    wait::Poll,
};

/// Ordered set of units started and stopped together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroup {
    units: Vec<String>,
}

impl ServiceGroup {
    pub fn new<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            units: units.into_iter().map(Into::into).collect(),
        }
    }

    /// Units in start order.
    pub fn units(&self) -> &[String] {
        &self.units
    }
}

impl Default for ServiceGroup {
    fn default() -> Self {
        Self::new(SERVICE_UNITS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Stop,
    Restart,
}

impl Transition {
    fn verb(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Restart => "restart",
        }
    }

    fn error(&self, service: &str) -> SanityError {
        let service = service.to_string();
        match self {
            Transition::Start => SanityError::StartService { service },
            Transition::Stop => SanityError::StopService { service },
            Transition::Restart => SanityError::RestartService { service },
        }
    }
}

/// Starts, stops and restarts a [`ServiceGroup`] as one unit and probes its
/// readiness.
pub struct ServiceManager {
    host: Arc<dyn Host>,
    group: ServiceGroup,
    init: InitSystem,
    readiness: Poll,
    port: u16,
}

impl ServiceManager {
    pub fn new(host: Arc<dyn Host>, group: ServiceGroup, readiness: Poll) -> Self {
        let init = InitSystem::detect(host.as_ref());
        debug!("Managing {:?} under {init:?}", group.units());
        Self {
            host,
            group,
            init,
            readiness,
            port: CQL_PORT,
        }
    }

    pub fn init_system(&self) -> InitSystem {
        self.init
    }

    pub fn group(&self) -> &ServiceGroup {
        &self.group
    }

    fn control(&self, unit: &str, action: &str) -> Invocation {
        let line = match self.init {
            InitSystem::Systemd => format!("systemctl {action} {unit}"),
            InitSystem::SysV => format!("service {unit} {action}"),
        };
        Invocation::new(line).sudo().ignore_status()
    }

    /// Whether the unit reports an active state.
    pub fn is_active(&self, unit: &str) -> bool {
        let query = match self.init {
            InitSystem::Systemd => Invocation::new(format!("systemctl is-active {unit}")),
            InitSystem::SysV => Invocation::new(format!("service {unit} status")),
        };
        match self.host.execute(&query.ignore_status()) {
            Ok(output) => output.is_success(),
            Err(err) => {
                debug!("Status query for {unit} failed: {err}");
                false
            }
        }
    }

    fn dump_journal(&self) {
        if !self.init.is_systemd() {
            return;
        }
        match self
            .host
            .execute(&Invocation::new("journalctl -xe").ignore_status())
        {
            Ok(output) => warn!("journalctl -xe:\n{}", output.stdout),
            Err(err) => warn!("Could not read the journal: {err}"),
        }
    }

    fn transition(&self, transition: Transition) -> Result<(), SanityError> {
        let verb = transition.verb();
        let order: Vec<&String> = match transition {
            Transition::Stop => self.group.units.iter().rev().collect(),
            Transition::Start | Transition::Restart => self.group.units.iter().collect(),
        };

        for unit in order {
            info!("Running {verb} for {unit}");
            if let Err(err) = self.host.execute(&self.control(unit, verb)) {
                warn!("Could not {verb} {unit}: {err}");
            }
        }

        let want_active = transition != Transition::Stop;
        for unit in &self.group.units {
            if self.is_active(unit) != want_active {
                self.dump_journal();
                return Err(transition.error(unit));
            }
        }
        Ok(())
    }

    /// Starts every unit in order, then requires all of them to be active.
    pub fn start_services(&self) -> Result<(), SanityError> {
        self.transition(Transition::Start)
    }

    /// Stops every unit in reverse order, then requires all of them to be inactive.
    pub fn stop_services(&self) -> Result<(), SanityError> {
        self.transition(Transition::Stop)
    }

    /// Restarts every unit in order, then requires all of them to be active.
    pub fn restart_services(&self) -> Result<(), SanityError> {
        self.transition(Transition::Restart)
    }

    /// Every unit is active and the client port is taken.
    pub fn is_up(&self) -> bool {
        self.group.units.iter().all(|unit| self.is_active(unit)) && self.host.port_in_use(self.port)
    }

    /// Blocks until the group accepts client connections.
    pub fn wait_services_up(&self) -> Result<(), SanityError> {
        let timeout = self.readiness.timeout;
        self.readiness.wait_or(
            "Waiting for scylla to accept clients",
            || self.is_up(),
            || SanityError::ReadinessTimeout { timeout },
        )?;
        info!("Service group is up on port {}", self.port);
        Ok(())
    }
}
