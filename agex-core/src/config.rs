//! Configuration types for the agex runtime (SPEC_FULL.md §1.1, §6).

use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// LLM provider selection and call parameters, the programmatic layer
/// between explicit call arguments and environment defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            top_p: 1.0,
        }
    }
}

impl LlmConfig {
    /// Build from environment variables, falling back to `defaults` for any
    /// variable that is unset or unparsable.
    ///
    /// Recognizes `AGEX_LLM_PROVIDER`, `AGEX_LLM_MODEL`,
    /// `AGEX_LLM_TEMPERATURE`, `AGEX_LLM_MAX_TOKENS`, `AGEX_LLM_TOP_P`.
    /// Precedence as specified: explicit call args > programmatic global
    /// config > env > hard-coded defaults. This constructor implements the
    /// latter two tiers; callers layer explicit args and a programmatic
    /// config on top by overwriting the returned struct's fields.
    pub fn from_env_with_defaults(defaults: LlmConfig) -> Self {
        Self {
            provider: std::env::var("AGEX_LLM_PROVIDER")
                .ok()
                .unwrap_or(defaults.provider),
            model: std::env::var("AGEX_LLM_MODEL").ok().unwrap_or(defaults.model),
            temperature: std::env::var("AGEX_LLM_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: std::env::var("AGEX_LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            top_p: std::env::var("AGEX_LLM_TOP_P")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.top_p),
        }
    }

    /// Build straight from the environment over hard-coded defaults, the
    /// common case.
    pub fn from_env() -> Self {
        Self::from_env_with_defaults(LlmConfig::default())
    }
}

/// Retry/backoff policy for LLM calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Resource limits enforced by the evaluator and task loop (SPEC_FULL.md §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeLimits {
    pub max_iterations: u32,
    #[serde(with = "duration_ms")]
    pub eval_timeout: Duration,
    pub max_operations: u64,
    pub sampling_threshold: usize,
    pub sample_size: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            eval_timeout: Duration::from_secs(30),
            max_operations: 2_000_000,
            sampling_threshold: 100,
            sample_size: 10,
        }
    }
}

/// Master configuration struct for an agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub limits: RuntimeLimits,
    pub token_budget: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            limits: RuntimeLimits::default(),
            token_budget: 8000,
        }
    }
}

impl RuntimeConfig {
    /// Build from environment variables layered over hard-coded defaults.
    pub fn from_env() -> Self {
        Self {
            llm: LlmConfig::from_env(),
            ..Self::default()
        }
    }

    /// Validate the configuration, mirroring the "ALL values required, no
    /// silent defaults past this point" discipline used elsewhere in this
    /// workspace's data crate.
    pub fn validate(&self) -> AgexResult<()> {
        if self.token_budget == 0 {
            return Err(AgexError::Config(ConfigError::InvalidValue {
                field: "token_budget".to_string(),
                value: self.token_budget.to_string(),
                reason: "token_budget must be greater than 0".to_string(),
            }));
        }
        if self.limits.max_iterations == 0 {
            return Err(AgexError::Config(ConfigError::InvalidValue {
                field: "limits.max_iterations".to_string(),
                value: self.limits.max_iterations.to_string(),
                reason: "max_iterations must be greater than 0".to_string(),
            }));
        }
        if self.limits.eval_timeout.is_zero() {
            return Err(AgexError::Config(ConfigError::InvalidValue {
                field: "limits.eval_timeout".to_string(),
                value: format!("{:?}", self.limits.eval_timeout),
                reason: "eval_timeout must be positive".to_string(),
            }));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgexError::Config(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                value: self.llm.temperature.to_string(),
                reason: "temperature must be between 0.0 and 2.0".to_string(),
            }));
        }
        if self.retry.backoff_multiplier <= 0.0 {
            return Err(AgexError::Config(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier".to_string(),
                value: self.retry.backoff_multiplier.to_string(),
                reason: "backoff_multiplier must be positive".to_string(),
            }));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_token_budget_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.token_budget = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_model() {
        std::env::set_var("AGEX_LLM_MODEL", "gpt-5");
        let llm = LlmConfig::from_env();
        assert_eq!(llm.model, "gpt-5");
        std::env::remove_var("AGEX_LLM_MODEL");
    }

    #[test]
    fn unset_env_falls_back_to_defaults() {
        std::env::remove_var("AGEX_LLM_TEMPERATURE");
        let llm = LlmConfig::from_env();
        assert_eq!(llm.temperature, LlmConfig::default().temperature);
    }
}
