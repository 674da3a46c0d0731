//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$TAKEOUT_XREF_CONFIG` (environment variable)
//! 2. `~/.config/takeout-xref/config.toml` (Linux/macOS)
//!    `%APPDATA%\takeout-xref\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever the file provides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::correlate::FormatVersion;
use crate::error::{Result, XrefError};
use crate::run::{RunOptions, RunPaths};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TAKEOUT_XREF_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// What a run processes and produces.
    pub run: RunConfig,
    /// The host case the run executes against.
    pub host: HostConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Tag every matched item with `<tag_prefix>|<label>`.
    pub apply_label_tags: bool,
    pub tag_prefix: String,
    /// Directory receiving the log file and both CSV reports.
    pub log_directory: PathBuf,
    /// Takeout XML export files.
    pub xml_files: Vec<PathBuf>,
    /// MBOX containers for the legacy xref; the case's MBOX items when empty.
    pub mbox_files: Vec<PathBuf>,
    /// The data was processed by a host older than 7.4.
    pub data_is_pre_74: bool,
    /// Restrict the run to emails inside these MBOX items.
    pub selected_mbox_guids: Vec<String>,
}

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host format version, `major.minor[.patch]`.
    pub format_version: String,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Correlation worker threads (0 = one per CPU).
    pub workers: usize,
    /// MBOX read buffer size in bytes (default: 1048576 = 1 MB).
    pub read_buffer_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            apply_label_tags: true,
            tag_prefix: "GMailLabels".to_string(),
            log_directory: PathBuf::from("takeout-xref-logs"),
            xml_files: Vec::new(),
            mbox_files: Vec::new(),
            data_is_pre_74: false,
            selected_mbox_guids: Vec::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            format_version: "7.4".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            read_buffer_size: crate::parser::mbox::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// Check the settings a run cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.run.xml_files.is_empty() {
            return Err(XrefError::Setup(
                "Please provide at least one XML file".to_string(),
            ));
        }
        if let Some(missing) = self.run.xml_files.iter().find(|p| !p.exists()) {
            return Err(XrefError::FileNotFound(missing.clone()));
        }
        if self.run.log_directory.as_os_str().is_empty() {
            return Err(XrefError::Setup(
                "Please provide a valid log directory".to_string(),
            ));
        }
        if self.run.apply_label_tags && self.run.tag_prefix.trim().is_empty() {
            return Err(XrefError::Setup(
                "Tag prefix must not be empty when applying label tags".to_string(),
            ));
        }
        self.format_version().map(|_| ())
    }

    pub fn format_version(&self) -> Result<FormatVersion> {
        self.host.format_version.parse()
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        match self.performance.workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }

    /// Validate and turn the configuration into options for one run.
    pub fn run_options(&self, paths: RunPaths) -> Result<RunOptions> {
        self.validate()?;
        Ok(RunOptions {
            xml_files: self.run.xml_files.clone(),
            mbox_files: self.run.mbox_files.clone(),
            selected_mbox_guids: self.run.selected_mbox_guids.clone(),
            apply_label_tags: self.run.apply_label_tags,
            tag_prefix: self.run.tag_prefix.trim().to_string(),
            data_is_pre_74: self.run.data_is_pre_74,
            host_version: self.format_version()?,
            workers: self.workers(),
            read_buffer_size: Some(self.performance.read_buffer_size),
            paths,
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    Loaded(PathBuf),
    /// The file exists but could not be read or parsed.
    Ignored { path: PathBuf, error: String },
}

impl ConfigSource {
    /// Report the source through `tracing`. Call once logging is set up.
    pub fn log(&self) {
        match self {
            Self::Defaults => tracing::debug!("No config file, using defaults"),
            Self::Loaded(path) => tracing::info!(path = %path.display(), "Loaded config"),
            Self::Ignored { path, error } => tracing::warn!(
                path = %path.display(),
                error = %error,
                "Ignoring config file, using defaults"
            ),
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Falls back to the defaults when no file exists or it cannot be used.
/// Nothing is logged here since the subscriber depends on the result.
pub fn load_config() -> (Config, ConfigSource) {
    load_config_from(config_file_path())
}

/// Load configuration from an explicit candidate path.
pub fn load_config_from(path: Option<PathBuf>) -> (Config, ConfigSource) {
    let Some(path) = path.filter(|p| p.exists()) else {
        return (Config::default(), ConfigSource::Defaults);
    };
    match read_config(&path) {
        Ok(cfg) => (cfg, ConfigSource::Loaded(path)),
        Err(e) => (
            Config::default(),
            ConfigSource::Ignored {
                path,
                error: e.to_string(),
            },
        ),
    }
}

/// Read one config file.
pub fn read_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("takeout-xref").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::ExtractionMode;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert!(cfg.run.apply_label_tags);
        assert_eq!(cfg.run.tag_prefix, "GMailLabels");
        assert_eq!(cfg.host.format_version, "7.4");
        assert!(!cfg.run.data_is_pre_74);
        assert_eq!(cfg.performance.read_buffer_size, 1024 * 1024);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.run.xml_files = vec![PathBuf::from("a.xml"), PathBuf::from("b.xml")];
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.run.xml_files, cfg.run.xml_files);
        assert_eq!(parsed.run.tag_prefix, cfg.run.tag_prefix);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[run]
tag_prefix = "Gmail"
data_is_pre_74 = true

[host]
format_version = "7.2.1"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.run.tag_prefix, "Gmail");
        assert!(cfg.run.data_is_pre_74);
        assert!(cfg.run.apply_label_tags);
        assert_eq!(cfg.format_version().unwrap(), FormatVersion::new(7, 2, 1));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("export.xml");
        std::fs::write(&xml, "<Documents/>").unwrap();

        let mut cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(XrefError::Setup(_))));

        cfg.run.xml_files = vec![dir.path().join("missing.xml")];
        assert!(matches!(cfg.validate(), Err(XrefError::FileNotFound(_))));

        cfg.run.xml_files = vec![xml];
        cfg.run.log_directory = PathBuf::new();
        assert!(matches!(cfg.validate(), Err(XrefError::Setup(_))));

        cfg.run.log_directory = dir.path().join("logs");
        cfg.host.format_version = "seven".into();
        assert!(matches!(cfg.validate(), Err(XrefError::InvalidVersion(_))));

        cfg.host.format_version = "7.4".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[performance]\nworkers = 2\n").unwrap();
        assert_eq!(read_config(&path).unwrap().performance.workers, 2);

        std::fs::write(&path, "[performance\nworkers = ").unwrap();
        assert!(read_config(&path).is_err());
    }

    #[test]
    fn test_load_config_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (cfg, source) = load_config_from(Some(path.clone()));
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(cfg.run.tag_prefix, "GMailLabels");

        std::fs::write(&path, "[run]\ntag_prefix = \"Gmail\"\n").unwrap();
        let (cfg, source) = load_config_from(Some(path.clone()));
        assert_eq!(source, ConfigSource::Loaded(path.clone()));
        assert_eq!(cfg.run.tag_prefix, "Gmail");

        std::fs::write(&path, "[run\ntag_prefix = ").unwrap();
        let (cfg, source) = load_config_from(Some(path.clone()));
        assert!(matches!(source, ConfigSource::Ignored { path: ref p, .. } if *p == path));
        assert_eq!(cfg.run.tag_prefix, "GMailLabels");
    }

    #[test]
    fn test_run_options() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("export.xml");
        std::fs::write(&xml, "<Documents/>").unwrap();

        let mut cfg = Config::default();
        cfg.run.xml_files = vec![xml];
        cfg.run.tag_prefix = "  Labels ".into();
        cfg.performance.workers = 3;
        let paths = RunPaths::with_timestamp(dir.path(), "20240101_00-00-00");
        let options = cfg.run_options(paths).unwrap();
        assert_eq!(options.tag_prefix, "Labels");
        assert_eq!(options.workers, 3);
        assert_eq!(
            ExtractionMode::select(&options.host_version, options.data_is_pre_74),
            ExtractionMode::Native
        );
    }
}
