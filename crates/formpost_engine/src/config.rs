//! JSON configuration: form URL, header mapping, value rules and submission settings.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use formpost_core::{
    contains_placeholder, HeaderMapping, MappingError, NormalizationRules, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ClientSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("mapping value for header {0:?} must be a string field identifier")]
    NonStringFieldId(String),
    #[error("{section} refers to header {header:?} which is not in the mapping")]
    UnknownHeader { section: &'static str, header: String },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("invalid submission setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormConfig {
    pub form_url: String,
    /// Header -> field identifier, in submission order.
    pub mapping: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub ignored: Vec<String>,
    #[serde(default)]
    pub choices: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub aliases: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub max_lengths: BTreeMap<String, usize>,
    #[serde(default)]
    pub submission: SubmissionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmissionSettings {
    pub chunk_size: usize,
    pub delay_ms: u64,
    pub jitter_ms: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    pub concurrency: usize,
    pub max_requests_per_second: Option<f64>,
    pub user_agent: String,
    pub record_payloads: bool,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            delay_ms: 1500,
            jitter_ms: 600,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_factor: 1.8,
            max_backoff_ms: 60_000,
            concurrency: 1,
            max_requests_per_second: None,
            user_agent: "Mozilla/5.0".to_string(),
            record_payloads: true,
        }
    }
}

impl SubmissionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor >= 1.0) {
            return Err(ConfigError::Invalid("backoff_factor must be >= 1.0".into()));
        }
        if let Some(rps) = self.max_requests_per_second {
            if !(rps.is_finite() && rps > 0.0) {
                return Err(ConfigError::Invalid(
                    "max_requests_per_second must be positive".into(),
                ));
            }
        }
        if self.concurrency > 1 && self.delay_ms == 0 && self.max_requests_per_second.is_none() {
            return Err(ConfigError::Invalid(
                "concurrency above 1 needs delay_ms or max_requests_per_second to bound the rate"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// With several requests in flight the inter-row delay becomes the global spacing,
    /// unless an explicit request rate is configured.
    pub fn min_request_interval(&self) -> Duration {
        match self.max_requests_per_second {
            Some(rps) => Duration::from_secs_f64(1.0 / rps),
            None if self.concurrency > 1 => Duration::from_millis(self.delay_ms),
            None => Duration::ZERO,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            send_referer: true,
            max_in_flight: self.concurrency,
            min_interval: self.min_request_interval(),
        }
    }
}

impl FormConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.submission.validate()?;
        Ok(config)
    }

    pub fn header_mapping(&self) -> Result<HeaderMapping, ConfigError> {
        let mut pairs = Vec::with_capacity(self.mapping.len());
        for (header, value) in &self.mapping {
            let field_id = value
                .as_str()
                .ok_or_else(|| ConfigError::NonStringFieldId(header.clone()))?;
            pairs.push((header.clone(), field_id.to_string()));
        }
        let mut mapping = HeaderMapping::new(pairs)?;
        for header in &self.required {
            mapping = mapping.require(header)?;
        }
        for header in &self.ignored {
            mapping = mapping.ignore(header.clone());
        }
        Ok(mapping)
    }

    /// Translate header-keyed value rules into rules keyed by field identifier.
    pub fn normalization_rules(
        &self,
        mapping: &HeaderMapping,
    ) -> Result<NormalizationRules, ConfigError> {
        let field = |section: &'static str, header: &str| {
            mapping
                .field_id(header)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::UnknownHeader {
                    section,
                    header: header.to_string(),
                })
        };

        let mut rules = NormalizationRules::new();
        for (header, choices) in &self.choices {
            rules = rules.with_choices(&field("choices", header)?, choices.iter().cloned());
        }
        for (header, aliases) in &self.aliases {
            let field_id = field("aliases", header)?;
            for (alias, canonical) in aliases {
                rules = rules.with_alias(&field_id, alias, canonical.clone());
            }
        }
        for (header, max) in &self.max_lengths {
            rules = rules.with_max_length(&field("max_lengths", header)?, *max);
        }
        Ok(rules)
    }

    /// The form URL or a field identifier still holds a template placeholder.
    pub fn has_placeholders(&self) -> bool {
        contains_placeholder(&self.form_url)
            || self
                .mapping
                .values()
                .any(|v| v.as_str().is_some_and(contains_placeholder))
    }
}
