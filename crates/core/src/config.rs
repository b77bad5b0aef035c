use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Effective engine configuration.
///
/// Every threshold the pipeline consults lives here so there is a single
/// source of truth: the qualify/hot gates, the K shorthand cutoff, the reply
/// length budgets, and the finance constants all read from this struct.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub llm: LlmServiceConfig,
    pub matcher: MatcherConfig,
    pub crm: CrmConfig,
    pub retry: RetryConfig,
    pub qualification: QualificationConfig,
    pub finance: FinanceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmServiceConfig {
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MatcherConfig {
    pub result_limit: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

/// Inputs for the retry wrapper. Consumed, never mutated.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub jitter_factor: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QualificationConfig {
    /// Financial readiness score at or above which a buyer is qualified.
    pub qualify_threshold: f64,
    /// Financial readiness score at or above which scheduling short circuits
    /// straight to an appointment.
    pub hot_threshold: f64,
    /// Plain numeric tokens in [k_shorthand_min, k_shorthand_max) are read
    /// as thousands; below the minimum they are treated as room counts and
    /// discarded.
    pub k_shorthand_min: i64,
    pub k_shorthand_max: i64,
    /// When exactly one amount is found it becomes the maximum and the
    /// minimum is synthesized at this fraction of it.
    pub single_amount_min_fraction: f64,
    /// Soft per reply budget; the wrapper enforces the hard cap.
    pub reply_soft_limit: usize,
    pub reply_hard_limit: usize,
}

impl Default for QualificationConfig {
    fn default() -> Self {
        Self {
            qualify_threshold: 70.0,
            hot_threshold: 80.0,
            k_shorthand_min: 100,
            k_shorthand_max: 1_000,
            single_amount_min_fraction: 0.8,
            reply_soft_limit: 290,
            reply_hard_limit: 320,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FinanceConfig {
    /// Fraction of the purchase price assumed as down payment.
    pub down_payment_rate: Decimal,
    pub annual_interest_rate: Decimal,
    pub term_years: u32,
    pub annual_property_tax_rate: Decimal,
    /// Flat yearly insurance estimate in dollars.
    pub annual_insurance: Decimal,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub qualify_threshold: Option<f64>,
    pub hot_threshold: Option<f64>,
    pub crm_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmServiceConfig {
                model: "claude-3-5-haiku".to_string(),
                api_key: None,
                base_url: None,
                timeout_secs: 20,
            },
            matcher: MatcherConfig { result_limit: 5, timeout_secs: 10 },
            crm: CrmConfig { enabled: true, timeout_secs: 10 },
            retry: RetryConfig { max_retries: 3, initial_backoff_ms: 500, jitter_factor: 0.25 },
            qualification: QualificationConfig::default(),
            finance: FinanceConfig {
                down_payment_rate: Decimal::new(20, 2),
                annual_interest_rate: Decimal::new(675, 4),
                term_years: 30,
                annual_property_tax_rate: Decimal::new(110, 4),
                annual_insurance: Decimal::new(1_800, 0),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    #[serde(default)]
    llm: LlmPatch,
    #[serde(default)]
    matcher: MatcherPatch,
    #[serde(default)]
    crm: CrmPatch,
    #[serde(default)]
    retry: RetryPatch,
    #[serde(default)]
    qualification: QualificationPatch,
    #[serde(default)]
    finance: FinancePatch,
    #[serde(default)]
    logging: LoggingPatch,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MatcherPatch {
    result_limit: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    enabled: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    jitter_factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct QualificationPatch {
    qualify_threshold: Option<f64>,
    hot_threshold: Option<f64>,
    k_shorthand_min: Option<i64>,
    k_shorthand_max: Option<i64>,
    single_amount_min_fraction: Option<f64>,
    reply_soft_limit: Option<usize>,
    reply_hard_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FinancePatch {
    down_payment_rate: Option<Decimal>,
    annual_interest_rate: Option<Decimal>,
    term_years: Option<u32>,
    annual_property_tax_rate: Option<Decimal>,
    annual_insurance: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let maybe_path = resolve_config_path(options.config_path.as_deref());
        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let wanted = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(wanted));
        }

        config.apply_env()?;
        config.apply_overrides(&options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(model) = patch.llm.model {
            self.llm.model = model;
        }
        if let Some(api_key) = patch.llm.api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(base_url) = patch.llm.base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(timeout) = patch.llm.timeout_secs {
            self.llm.timeout_secs = timeout;
        }
        if let Some(limit) = patch.matcher.result_limit {
            self.matcher.result_limit = limit;
        }
        if let Some(timeout) = patch.matcher.timeout_secs {
            self.matcher.timeout_secs = timeout;
        }
        if let Some(enabled) = patch.crm.enabled {
            self.crm.enabled = enabled;
        }
        if let Some(timeout) = patch.crm.timeout_secs {
            self.crm.timeout_secs = timeout;
        }
        if let Some(max_retries) = patch.retry.max_retries {
            self.retry.max_retries = max_retries;
        }
        if let Some(backoff) = patch.retry.initial_backoff_ms {
            self.retry.initial_backoff_ms = backoff;
        }
        if let Some(jitter) = patch.retry.jitter_factor {
            self.retry.jitter_factor = jitter;
        }
        if let Some(value) = patch.qualification.qualify_threshold {
            self.qualification.qualify_threshold = value;
        }
        if let Some(value) = patch.qualification.hot_threshold {
            self.qualification.hot_threshold = value;
        }
        if let Some(value) = patch.qualification.k_shorthand_min {
            self.qualification.k_shorthand_min = value;
        }
        if let Some(value) = patch.qualification.k_shorthand_max {
            self.qualification.k_shorthand_max = value;
        }
        if let Some(value) = patch.qualification.single_amount_min_fraction {
            self.qualification.single_amount_min_fraction = value;
        }
        if let Some(value) = patch.qualification.reply_soft_limit {
            self.qualification.reply_soft_limit = value;
        }
        if let Some(value) = patch.qualification.reply_hard_limit {
            self.qualification.reply_hard_limit = value;
        }
        if let Some(value) = patch.finance.down_payment_rate {
            self.finance.down_payment_rate = value;
        }
        if let Some(value) = patch.finance.annual_interest_rate {
            self.finance.annual_interest_rate = value;
        }
        if let Some(value) = patch.finance.term_years {
            self.finance.term_years = value;
        }
        if let Some(value) = patch.finance.annual_property_tax_rate {
            self.finance.annual_property_tax_rate = value;
        }
        if let Some(value) = patch.finance.annual_insurance {
            self.finance.annual_insurance = value;
        }
        if let Some(level) = patch.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = patch.logging.format {
            self.logging.format = format;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(level) = read_env("HEARTH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("HEARTH_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(model) = read_env("HEARTH_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(api_key) = read_env("HEARTH_LLM_API_KEY") {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(raw) = read_env("HEARTH_QUALIFY_THRESHOLD") {
            self.qualification.qualify_threshold = parse_env("HEARTH_QUALIFY_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read_env("HEARTH_HOT_THRESHOLD") {
            self.qualification.hot_threshold = parse_env("HEARTH_HOT_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read_env("HEARTH_CRM_ENABLED") {
            self.crm.enabled = parse_env("HEARTH_CRM_ENABLED", &raw)?;
        }
        if let Some(raw) = read_env("HEARTH_MAX_RETRIES") {
            self.retry.max_retries = parse_env("HEARTH_MAX_RETRIES", &raw)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(model) = &overrides.llm_model {
            self.llm.model = model.clone();
        }
        if let Some(api_key) = &overrides.llm_api_key {
            self.llm.api_key = Some(api_key.clone().into());
        }
        if let Some(value) = overrides.qualify_threshold {
            self.qualification.qualify_threshold = value;
        }
        if let Some(value) = overrides.hot_threshold {
            self.qualification.hot_threshold = value;
        }
        if let Some(enabled) = overrides.crm_enabled {
            self.crm.enabled = enabled;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.qualification;
        for (name, value) in [
            ("qualification.qualify_threshold", q.qualify_threshold),
            ("qualification.hot_threshold", q.hot_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }
        if q.k_shorthand_min <= 0 || q.k_shorthand_max <= q.k_shorthand_min {
            return Err(ConfigError::Validation(format!(
                "k shorthand window must satisfy 0 < min < max, got [{}, {})",
                q.k_shorthand_min, q.k_shorthand_max
            )));
        }
        if !(0.0..1.0).contains(&q.single_amount_min_fraction) {
            return Err(ConfigError::Validation(format!(
                "qualification.single_amount_min_fraction must be within [0, 1), got {}",
                q.single_amount_min_fraction
            )));
        }
        if q.reply_soft_limit == 0 || q.reply_hard_limit < q.reply_soft_limit {
            return Err(ConfigError::Validation(format!(
                "reply limits must satisfy 0 < soft <= hard, got soft={} hard={}",
                q.reply_soft_limit, q.reply_hard_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::Validation(format!(
                "retry.jitter_factor must be within [0, 1], got {}",
                self.retry.jitter_factor
            )));
        }
        if self.retry.max_retries > 10 {
            return Err(ConfigError::Validation(format!(
                "retry.max_retries must be at most 10, got {}",
                self.retry.max_retries
            )));
        }
        if self.finance.term_years == 0 {
            return Err(ConfigError::Validation("finance.term_years must be positive".to_owned()));
        }
        Ok(())
    }
}

const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat};

    #[test]
    fn defaults_pass_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.qualification.qualify_threshold, 70.0);
        assert_eq!(config.qualification.hot_threshold, 80.0);
        assert_eq!(config.qualification.k_shorthand_min, 100);
    }

    #[test]
    fn toml_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[qualification]\nqualify_threshold = 65.0\n\n[logging]\nlevel = \"debug\"\nformat = \"json\""
        )
        .expect("write config");

        let config = EngineConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.qualification.qualify_threshold, 65.0);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        // Untouched sections keep their defaults.
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn explicit_overrides_win_over_file_values() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[llm]\nmodel = \"from file\"").expect("write config");

        let config = EngineConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                llm_model: Some("from override".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("load config");

        assert_eq!(config.llm.model, "from override");
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = EngineConfig::load(LoadOptions {
            config_path: Some("definitely/not/here.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn nonsense_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.qualification.qualify_threshold = 140.0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = EngineConfig::default();
        config.qualification.reply_hard_limit = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = EngineConfig::default();
        config.retry.jitter_factor = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
