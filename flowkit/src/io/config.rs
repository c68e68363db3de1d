//! Toolkit configuration stored as TOML (conventionally `flowkit.toml`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Toolkit configuration (TOML).
///
/// Every section is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolkitConfig {
    pub logging: LoggingConfig,
    pub series: SeriesConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level when `RUST_LOG` is unset.
    pub level: String,

    /// Targets silenced entirely (e.g. `flowkit::flow::series`).
    pub mute: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            mute: Vec::new(),
        }
    }
}

/// Defaults applied to series built from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeriesConfig {
    /// Items in flight at once.
    pub concurrency: usize,

    /// Gap between item starts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub retries: u32,

    /// Wait between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 4,
            delay_ms: 1000,
        }
    }
}

impl ToolkitConfig {
    /// Parse and validate TOML settings.
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).context("malformed TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validated settings rendered as TOML, newline terminated.
    pub fn to_toml(&self) -> Result<String> {
        self.validate()?;
        let mut text = toml::to_string_pretty(self).context("rendering settings as TOML")?;
        text.push('\n');
        Ok(text)
    }

    pub fn validate(&self) -> Result<()> {
        if !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "logging.level must be one of {}: got {:?}",
                LEVELS.join(", "),
                self.logging.level
            ));
        }
        if self.logging.mute.iter().any(|target| target.trim().is_empty()) {
            return Err(anyhow!("logging.mute entries must be non-empty"));
        }
        if self.series.concurrency == 0 {
            return Err(anyhow!("series.concurrency must be > 0"));
        }
        Ok(())
    }
}

/// Load the settings at `path`, falling back to defaults when there is no
/// such file. Anything else that goes wrong reading it is an error.
pub fn load_config(path: &Path) -> Result<ToolkitConfig> {
    match fs::read_to_string(path) {
        Ok(text) => ToolkitConfig::from_toml(&text)
            .with_context(|| format!("flowkit settings in {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let defaults = ToolkitConfig::default();
            defaults.validate()?;
            Ok(defaults)
        }
        Err(err) => {
            Err(err).with_context(|| format!("reading flowkit settings from {}", path.display()))
        }
    }
}

/// Replace the settings at `path`. The new file is staged next to the old
/// one and renamed over it, so readers never see a partial file.
pub fn write_config(path: &Path, cfg: &ToolkitConfig) -> Result<()> {
    let text = cfg.to_toml()?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating settings dir {}", dir.display()))?;

    let staged = staging_path(path);
    fs::write(&staged, text).with_context(|| format!("staging settings in {}", staged.display()))?;
    if let Err(err) = fs::rename(&staged, path) {
        let _ = fs::remove_file(&staged);
        return Err(err).with_context(|| format!("installing settings at {}", path.display()));
    }
    Ok(())
}

/// Hidden sibling used while writing `path`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "flowkit.toml".into(), |name| name.to_string_lossy());
    path.with_file_name(format!(".{name}.partial"))
}
