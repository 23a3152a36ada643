//! Tool configuration loaded from TOML.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ilcd::epd::error::{IlcdError, Result};
use crate::ilcd::epd::model::{DatasetRef, LangPreference};

/// Default user agent sent with every HTTP request.
pub const DEFAULT_USER_AGENT: &str = concat!("ilcd-epd-tools/", env!("CARGO_PKG_VERSION"));

/// Largest accepted `http.backoff_factor`, in seconds.
pub const MAX_BACKOFF_FACTOR: f64 = 3600.0;

/// Smallest accepted `http.requests_per_second`.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub conversion: ConversionSettings,
    /// Known soda4LCA endpoints keyed by a short provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP client behaviour for remote media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base in seconds; attempt `n` waits `factor * 2^(n-1)`.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for a single backoff sleep, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_backoff_secs() -> u64 {
    120
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            max_backoff_secs: default_max_backoff_secs(),
            requests_per_second: default_requests_per_second(),
            user_agent: default_user_agent(),
        }
    }
}

/// Defaults applied to every conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Comma separated language preference, e.g. `en,de,*`. When unset the
    /// document's own languages decide.
    #[serde(default)]
    pub languages: Option<String>,
    /// Base URL used to build attachment links for local media.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Write partial output when required fields are missing.
    #[serde(default)]
    pub allow_incomplete: bool,
    /// ILCD directory or archive consulted for datasets the input lacks,
    /// typically the ILCD reference unit groups and flow properties.
    #[serde(default)]
    pub reference_data: Option<PathBuf>,
}

impl ConversionSettings {
    pub fn language_preference(&self) -> Option<LangPreference> {
        self.languages
            .as_deref()
            .map(LangPreference::parse)
            .filter(|pref| !pref.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// soda4LCA resource root, e.g. `https://oekobaudat.de/OEKOBAU.DAT/resource`.
    pub base_url: String,
    /// Dialect to use for datasets from this provider.
    #[serde(default)]
    pub dialect: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` and `--debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IlcdError::MissingInput(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all fields and reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.http.timeout_secs == 0 {
            errors.push("http.timeout_secs must be positive".to_string());
        }
        let backoff = self.http.backoff_factor;
        if !backoff.is_finite() || !(0.0..=MAX_BACKOFF_FACTOR).contains(&backoff) {
            errors.push(format!(
                "http.backoff_factor must be between 0 and {MAX_BACKOFF_FACTOR}, got {backoff}"
            ));
        }
        let rate = self.http.requests_per_second;
        if !rate.is_finite() || rate < MIN_REQUESTS_PER_SECOND {
            errors.push(format!(
                "http.requests_per_second must be a finite value of at least {MIN_REQUESTS_PER_SECOND}, got {rate}"
            ));
        }
        for (name, provider) in &self.providers {
            if url::Url::parse(&provider.base_url).is_err() {
                errors.push(format!(
                    "providers.{name}.base_url is not a valid URL: {}",
                    provider.base_url
                ));
            }
        }
        if let Some(path) = &self.conversion.reference_data {
            if !path.exists() {
                errors.push(format!(
                    "conversion.reference_data does not exist: {}",
                    path.display()
                ));
            }
        }
        if let Some(base_url) = &self.conversion.base_url {
            if url::Url::parse(base_url).is_err() {
                errors.push(format!("conversion.base_url is not a valid URL: {base_url}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IlcdError::Config(errors.join("; ")))
        }
    }

    /// Dialect configured for the provider whose base URL prefixes `url`.
    pub fn provider_dialect(&self, url: &str) -> Option<&str> {
        let url = url.to_ascii_lowercase();
        self.providers.values().find_map(|provider| {
            let base = provider.base_url.trim_end_matches('/').to_ascii_lowercase();
            if url.starts_with(&base) {
                provider.dialect.as_deref()
            } else {
                None
            }
        })
    }

    /// Expands `provider:uuid[@version]` shorthand into a process URL.
    /// Anything but a well-formed UUID after the provider name is left
    /// alone.
    pub fn expand_provider_reference(&self, input: &str) -> Option<String> {
        let (provider, rest) = input.split_once(':')?;
        let provider = self.providers.get(provider)?;
        let reference = match rest.split_once('@') {
            Some((uuid, version)) => DatasetRef::process(uuid.trim(), Some(version.trim().to_string())),
            None => DatasetRef::process(rest.trim(), None),
        };
        if !reference.has_uuid() {
            return None;
        }
        let base = provider.base_url.trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{base}/processes/{}", reference.id)).ok()?;
        if let Some(version) = &reference.version {
            url.query_pairs_mut().append_pair("version", version);
        }
        Some(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").expect("empty config accepted");
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.logging.level, "warn");
        assert!(config.conversion.language_preference().is_none());
    }

    #[test]
    fn collects_all_validation_errors() {
        let err = Config::from_toml(
            r#"
            [http]
            timeout_secs = 0
            requests_per_second = 0

            [providers.broken]
            base_url = "not a url"
            "#,
        )
        .expect_err("invalid config rejected");
        let message = err.to_string();
        assert!(message.contains("timeout_secs"));
        assert!(message.contains("requests_per_second"));
        assert!(message.contains("providers.broken"));
    }

    #[test]
    fn rejects_backoff_factors_out_of_range() {
        for value in ["1e20", "inf", "nan", "-1.0"] {
            let err = Config::from_toml(&format!("[http]\nbackoff_factor = {value}\n"))
                .expect_err("backoff factor rejected");
            assert!(err.to_string().contains("http.backoff_factor"), "{value}: {err}");
        }
        assert!(Config::from_toml("[http]\nbackoff_factor = 0.5\n").is_ok());
    }

    #[test]
    fn rejects_request_rates_out_of_range() {
        for value in ["1e-20", "0", "inf"] {
            let err = Config::from_toml(&format!("[http]\nrequests_per_second = {value}\n"))
                .expect_err("request rate rejected");
            assert!(err.to_string().contains("http.requests_per_second"), "{value}: {err}");
        }
        assert!(Config::from_toml("[http]\nrequests_per_second = 0.5\n").is_ok());
    }

    #[test]
    fn reference_data_must_exist() {
        let err = Config::from_toml(
            r#"
            [conversion]
            reference_data = "/nonexistent/ilcd-reference-data"
            "#,
        )
        .expect_err("missing reference data rejected");
        assert!(err.to_string().contains("conversion.reference_data"));
    }

    #[test]
    fn expands_provider_shorthand() {
        let config = Config::from_toml(
            r#"
            [providers.oekobaudat]
            base_url = "https://oekobaudat.de/OEKOBAU.DAT/resource/"
            dialect = "oekobaudat"
            "#,
        )
        .expect("config parsed");
        assert_eq!(
            config
                .expand_provider_reference("oekobaudat:2eb43850-9d5b-4c02-b7b4-3d7c4f5e0a11@00.01.000")
                .as_deref(),
            Some("https://oekobaudat.de/OEKOBAU.DAT/resource/processes/2eb43850-9d5b-4c02-b7b4-3d7c4f5e0a11?version=00.01.000")
        );
        assert_eq!(
            config
                .expand_provider_reference("oekobaudat:2eb43850-9d5b-4c02-b7b4-3d7c4f5e0a11")
                .as_deref(),
            Some("https://oekobaudat.de/OEKOBAU.DAT/resource/processes/2eb43850-9d5b-4c02-b7b4-3d7c4f5e0a11")
        );
        assert_eq!(config.expand_provider_reference("unknown:abc"), None);
        assert_eq!(config.expand_provider_reference("oekobaudat:2eb43850"), None);
        assert_eq!(config.expand_provider_reference("oekobaudat:epd.zip"), None);
        assert_eq!(
            config.provider_dialect("https://OEKOBAU.de/OEKOBAU.DAT/resource/processes/x"),
            Some("oekobaudat")
        );
        assert_eq!(config.provider_dialect("https://data.environdec.com/resource"), None);
        assert_eq!(config.expand_provider_reference("https://host/x"), None);
    }
}
