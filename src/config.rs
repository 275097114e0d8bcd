//! Configuration management for artifact-sanity.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    constants::{
        DEFAULT_CONFIG_FILE, DEFAULT_REPORT_URL, DEFAULT_STATE_DIR, INDEX_REFRESH_STEP,
        INDEX_REFRESH_TIMEOUT, READINESS_STEP, READINESS_TIMEOUT, SETUP_DONE_FILE,
        STRESS_MIXED_TIMEOUT, STRESS_POPULATE_TIMEOUT, UUID_WAIT_STEP, UUID_WAIT_TIMEOUT,
    },
    error::SanityError,
    installer::{InstallMode, Platform},
    wait::Poll,
};

/// Represents the structure of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    /// URL or path of the repository descriptor to register.
    sw_repo: Option<String>,
    /// `ci`, `release` or a historical release tag.
    mode: Option<String>,
    /// Validate a preinstalled cloud image instead of installing.
    ami: Option<bool>,
    /// Skips `/etc/os-release` detection when set.
    platform: Option<Platform>,
    /// Directory holding the setup sentinel.
    state_dir: Option<PathBuf>,
    /// Endpoint receiving the housekeeping identifier.
    report_url: Option<String>,
    timing: Option<TimingFile>,
}

/// Poll bounds and command timeouts as duration strings ("30s", "5m").
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimingFile {
    index_refresh_step: Option<String>,
    index_refresh_timeout: Option<String>,
    readiness_step: Option<String>,
    readiness_timeout: Option<String>,
    uuid_wait_step: Option<String>,
    uuid_wait_timeout: Option<String>,
    stress_populate_timeout: Option<String>,
    stress_mixed_timeout: Option<String>,
}

/// Every bounded wait and command timeout of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Package index refresh and system upgrade.
    pub index_refresh: Poll,
    /// Service group readiness.
    pub readiness: Poll,
    /// Appearance of the housekeeping identifier.
    pub uuid_wait: Poll,
    pub stress_populate: Duration,
    pub stress_mixed: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            index_refresh: Poll::new(INDEX_REFRESH_STEP, INDEX_REFRESH_TIMEOUT),
            readiness: Poll::new(READINESS_STEP, READINESS_TIMEOUT),
            uuid_wait: Poll::new(UUID_WAIT_STEP, UUID_WAIT_TIMEOUT),
            stress_populate: STRESS_POPULATE_TIMEOUT,
            stress_mixed: STRESS_MIXED_TIMEOUT,
        }
    }
}

impl Timing {
    fn apply(&mut self, file: &TimingFile) -> Result<(), SanityError> {
        let set = |slot: &mut Duration, raw: &Option<String>| -> Result<(), SanityError> {
            if let Some(raw) = raw {
                *slot = parse_duration(raw)?;
            }
            Ok(())
        };

        set(&mut self.index_refresh.step, &file.index_refresh_step)?;
        set(&mut self.index_refresh.timeout, &file.index_refresh_timeout)?;
        set(&mut self.readiness.step, &file.readiness_step)?;
        set(&mut self.readiness.timeout, &file.readiness_timeout)?;
        set(&mut self.uuid_wait.step, &file.uuid_wait_step)?;
        set(&mut self.uuid_wait.timeout, &file.uuid_wait_timeout)?;
        set(&mut self.stress_populate, &file.stress_populate_timeout)?;
        set(&mut self.stress_mixed, &file.stress_mixed_timeout)?;
        Ok(())
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sw_repo: Option<String>,
    pub mode: InstallMode,
    pub ami: bool,
    pub platform: Option<Platform>,
    pub state_dir: PathBuf,
    pub report_url: String,
    pub timing: Timing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sw_repo: None,
            mode: InstallMode::Ci,
            ami: false,
            platform: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            report_url: DEFAULT_REPORT_URL.to_string(),
            timing: Timing::default(),
        }
    }
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sw_repo: Option<String>,
    pub mode: Option<String>,
    pub ami: bool,
}

impl Settings {
    /// Parses YAML settings after expanding `${VAR}` references.
    pub fn from_yaml(content: &str) -> Result<Self, SanityError> {
        let expanded = expand_env_vars(content)?;
        let file: SettingsFile = if expanded.trim().is_empty() {
            SettingsFile::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };

        let mut settings = Settings::default();
        if let Some(repo) = file.sw_repo {
            settings.sw_repo = Some(repo);
        }
        if let Some(mode) = file.mode {
            settings.mode = mode.parse()?;
        }
        settings.ami = file.ami.unwrap_or(false);
        settings.platform = file.platform.map(|p| Platform::new(&p.name, &p.version, &p.release));
        if let Some(dir) = file.state_dir {
            settings.state_dir = dir;
        }
        if let Some(url) = file.report_url {
            settings.report_url = url;
        }
        if let Some(timing) = &file.timing {
            settings.timing.apply(timing)?;
        }
        Ok(settings)
    }

    /// Loads settings from `path`, or from `artifact-sanity.yaml` in the
    /// working directory when present. Without either, defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, SanityError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Settings::default()),
        };

        let content = fs::read_to_string(path).map_err(|e| {
            SanityError::Io(std::io::Error::new(
                e.kind(),
                format!("{} ({})", e, path.display()),
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Applies command-line values over the loaded ones.
    pub fn apply(&mut self, overrides: &Overrides) -> Result<(), SanityError> {
        if let Some(repo) = &overrides.sw_repo {
            self.sw_repo = Some(repo.clone());
        }
        if let Some(mode) = &overrides.mode {
            self.mode = mode.parse()?;
        }
        if overrides.ami {
            self.ami = true;
        }
        Ok(())
    }

    /// Sentinel written once setup succeeded.
    pub fn setup_sentinel(&self) -> PathBuf {
        self.state_dir.join(SETUP_DONE_FILE)
    }
}

/// Parses "500ms", "30s", "5m", "1h" or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, SanityError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(SanityError::Config("Duration value cannot be empty".into()));
    }

    let invalid = || SanityError::Config(format!("Invalid duration value: '{raw}'"));

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

/// Expands `${VAR}` references. A reference to an unset variable is an error.
fn expand_env_vars(input: &str) -> Result<String, SanityError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|err| SanityError::Config(err.to_string()))?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        return Err(SanityError::Config(format!(
            "Missing environment variable: {missing}"
        )));
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.to_string())
}
