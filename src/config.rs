use config::{Config, ConfigError, Environment};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_THICKNESS_TOLERANCE: &str = "0.1";
const DEFAULT_SEARCH_RESULT_CAP: usize = 200;
const DEFAULT_PAGE_SIZE: u64 = 20;
const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Engine configuration with validation.
///
/// Every knob has a built-in default; deployments override through
/// `SLABSTOCK__`-prefixed environment variables (e.g.
/// `SLABSTOCK__SEARCH_RESULT_CAP=500`).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Symmetric tolerance band applied to thickness filters. A slab of
    /// thickness 2.05 matches a filter for 2.0 under the default 0.1.
    #[serde(default = "default_thickness_tolerance")]
    #[validate(custom = "validate_thickness_tolerance")]
    pub thickness_tolerance: Decimal,

    /// Hard cap on rows returned by the un-paginated slab listing.
    #[serde(default = "default_search_result_cap")]
    #[validate(custom = "validate_search_result_cap")]
    pub search_result_cap: usize,

    /// Default page size for paginated listings.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Maximum page size allowed for paginated listings.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thickness_tolerance: default_thickness_tolerance(),
            search_result_cap: default_search_result_cap(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            let mut err = ValidationError::new("default_page_size");
            err.message =
                Some("default_page_size must be between 1 and max_page_size".into());
            errors.add("default_page_size", err);
        }

        if self.max_page_size == 0 {
            let mut err = ValidationError::new("max_page_size");
            err.message = Some("max_page_size must be greater than 0".into());
            errors.add("max_page_size", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_thickness_tolerance() -> Decimal {
    dec!(0.1)
}

fn default_search_result_cap() -> usize {
    DEFAULT_SEARCH_RESULT_CAP
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u64 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_thickness_tolerance(tolerance: &Decimal) -> Result<(), ValidationError> {
    if tolerance.is_sign_negative() {
        let mut err = ValidationError::new("thickness_tolerance");
        err.message = Some("thickness_tolerance must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_search_result_cap(cap: usize) -> Result<(), ValidationError> {
    if cap == 0 {
        let mut err = ValidationError::new("search_result_cap");
        err.message = Some("search_result_cap must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Loads engine configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Environment variables (SLABSTOCK__*)
pub fn load_config() -> Result<EngineConfig, EngineConfigError> {
    let config = Config::builder()
        .set_default("thickness_tolerance", DEFAULT_THICKNESS_TOLERANCE)?
        .set_default("search_result_cap", DEFAULT_SEARCH_RESULT_CAP as u64)?
        .set_default("default_page_size", DEFAULT_PAGE_SIZE)?
        .set_default("max_page_size", DEFAULT_MAX_PAGE_SIZE)?
        .set_default(
            "event_channel_capacity",
            DEFAULT_EVENT_CHANNEL_CAPACITY as u64,
        )?
        .add_source(Environment::with_prefix("SLABSTOCK").separator("__"))
        .build()?;

    let engine_config: EngineConfig = config.try_deserialize()?;

    engine_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    engine_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(engine_config)
}
