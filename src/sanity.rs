//! The externally invoked entry points.
//!
//! Each entry point first makes sure the host was set up once (installer run
//! plus full verification, remembered through a sentinel file), then drives
//! its lifecycle step and the client workload. The sentinel lists the
//! packages whose scriptlets failed during setup, one per line, so every
//! later run on the host keeps failing on them.
use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::Settings,
    error::SanityError,
    host::Host,
    installer::{self, Installer, Platform, Variant},
    logs,
    packages::SoftwareManager,
    scriptlet::ScriptletFailures,
    service::{ServiceGroup, ServiceManager},
    verify::{VerificationReport, Verifier, VerifyContext},
    workload::Workload,
};

/// State owned by one orchestration run.
///
/// Every entry point fails last when setup recorded a scriptlet failure.
pub struct ArtifactSanity {
    host: Arc<dyn Host>,
    settings: Settings,
    software: SoftwareManager,
    services: ServiceManager,
    failures: ScriptletFailures,
    /// Setup ran or its sentinel was read during this run.
    setup_seen: bool,
    follow_logs: bool,
}

impl ArtifactSanity {
    pub fn new(host: Arc<dyn Host>, settings: Settings) -> Self {
        let software = SoftwareManager::new(settings.timing.index_refresh);
        let services = ServiceManager::new(
            host.clone(),
            ServiceGroup::default(),
            settings.timing.readiness,
        );
        Self {
            host,
            settings,
            software,
            services,
            failures: ScriptletFailures::new(),
            setup_seen: false,
            follow_logs: false,
        }
    }

    /// Forward the product logs from a background thread during setup.
    pub fn with_log_follower(mut self, enabled: bool) -> Self {
        self.follow_logs = enabled;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    /// Scriptlet failures recorded so far in this run.
    pub fn failures(&self) -> &ScriptletFailures {
        &self.failures
    }

    /// The configured platform, or the one read from the host.
    pub fn platform(&self) -> Result<Platform, SanityError> {
        match &self.settings.platform {
            Some(platform) => Ok(platform.clone()),
            None => Platform::detect(self.host.as_ref()),
        }
    }

    /// Resolves the installer variant without touching the host otherwise.
    pub fn select(&self) -> Result<(Platform, Variant), SanityError> {
        let platform = self.platform()?;
        let variant = installer::select(&platform, self.settings.ami)?;
        Ok((platform, variant))
    }

    pub fn is_setup_done(&self) -> bool {
        self.host.exists(&self.settings.setup_sentinel())
    }

    /// Installs and verifies the host unless an earlier run already did.
    /// Returns the verification report when setup ran.
    pub fn ensure_setup(&mut self) -> Result<Option<VerificationReport>, SanityError> {
        if self.is_setup_done() {
            if !self.setup_seen {
                info!(
                    "Setup already done ({}), skipping installation",
                    self.settings.setup_sentinel().display()
                );
                self.restore_failures()?;
            }
            return Ok(None);
        }

        if self.follow_logs
            && let Err(err) = logs::follow_product_logs(self.services.init_system())
        {
            warn!("Could not follow product logs: {err}");
        }

        let (platform, variant) = self.select()?;
        let report = Installer::new(
            self.host.as_ref(),
            &self.software,
            &self.services,
            &self.settings,
            &platform,
        )
        .run(variant, &mut self.failures)?;
        report.clone().into_result()?;

        let recorded: String = self
            .failures
            .packages()
            .iter()
            .map(|package| format!("{package}\n"))
            .collect();
        self.host
            .write_file(&self.settings.setup_sentinel(), &recorded)?;
        self.setup_seen = true;
        info!("Setup of {platform} with the {variant} installer completed");
        Ok(Some(report))
    }

    /// Loads the scriptlet failures a previous setup left in the sentinel.
    fn restore_failures(&mut self) -> Result<(), SanityError> {
        let recorded = self
            .host
            .read_to_string(&self.settings.setup_sentinel())?;
        for package in recorded.lines().map(str::trim).filter(|line| !line.is_empty()) {
            warn!("Setup recorded a scriptlet failure for {package}");
            self.failures.record(package);
        }
        self.setup_seen = true;
        Ok(())
    }

    /// Fails when any package reported a scriptlet failure during setup.
    fn check_scriptlets(&self) -> Result<(), SanityError> {
        if self.failures.is_empty() {
            return Ok(());
        }
        Err(SanityError::ScriptletFailure {
            packages: self.failures.packages().to_vec(),
        })
    }

    fn workload(&self) -> Workload<'_> {
        Workload::new(
            self.host.as_ref(),
            self.settings.timing.stress_populate,
            self.settings.timing.stress_mixed,
        )
    }

    fn verify_after_transition(&self) -> Result<VerificationReport, SanityError> {
        let platform = self.platform()?;
        let ctx = VerifyContext {
            family: platform.family(),
            distro: platform.name.clone(),
            init: self.services.init_system(),
            secondary_device: installer::detect_secondary_device(self.host.as_ref())?,
        };
        let report = Verifier::new(self.host.as_ref(), &ctx).post_transition();
        report.clone().into_result()?;
        Ok(report)
    }

    /// Sets the host up if needed, then runs the workload.
    pub fn install_and_verify(&mut self) -> Result<VerificationReport, SanityError> {
        let report = match self.ensure_setup()? {
            Some(report) => report,
            None => self.verify_after_transition()?,
        };
        self.workload().run()?;
        self.check_scriptlets()?;
        Ok(report)
    }

    /// Stops and starts the service group, then checks it still serves clients.
    pub fn stop_start_and_verify(&mut self) -> Result<VerificationReport, SanityError> {
        self.ensure_setup()?;
        self.services.stop_services()?;
        self.services.start_services()?;
        self.services.wait_services_up()?;
        let report = self.verify_after_transition()?;
        self.workload().run()?;
        self.check_scriptlets()?;
        Ok(report)
    }

    /// Restarts the service group, then checks it still serves clients.
    pub fn restart_and_verify(&mut self) -> Result<VerificationReport, SanityError> {
        self.ensure_setup()?;
        self.services.restart_services()?;
        self.services.wait_services_up()?;
        let report = self.verify_after_transition()?;
        self.workload().run()?;
        self.check_scriptlets()?;
        Ok(report)
    }
}
