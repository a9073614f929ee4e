use crate::config::types::{
    CacheBackendKind, CacheConfig, Config, CrawlConfig, DispatchConfig, FetchConfig,
    UserAgentConfig,
};
use crate::events::EventKind;
use crate::ConfigError;
use url::Url;

/// Upper bound for day-valued settings (roughly a century)
pub const MAX_DAYS: u64 = 36_500;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.service.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "service name cannot be empty".to_string(),
        ));
    }
    validate_user_agent_config(&config.user_agent)?;
    validate_cache_config(&config.cache)?;
    validate_fetch_config(&config.fetch)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_crawl_config(&config.crawl)?;

    if config.robots.ttl_days == 0 || config.robots.ttl_days > MAX_DAYS {
        return Err(ConfigError::Validation(format!(
            "robots ttl_days must be between 1 and {}",
            MAX_DAYS
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.min_duration_secs > config.max_duration_secs {
        return Err(ConfigError::InvalidWindow {
            min: config.min_duration(),
            max: config.max_duration(),
        });
    }

    if config.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "cache sweep_interval_secs must be >= 1".to_string(),
        ));
    }

    match config.backend {
        CacheBackendKind::Memory => {}
        CacheBackendKind::Sqlite => {
            if config.path.is_empty() {
                return Err(ConfigError::Validation(
                    "cache path cannot be empty for the sqlite backend".to_string(),
                ));
            }
        }
        CacheBackendKind::Redis => {
            Url::parse(&config.url)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid cache url: {}", e)))?;
            if config.pool_size == 0 {
                return Err(ConfigError::Validation(
                    "cache pool_size must be >= 1".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "fetch max_bytes must be >= 1".to_string(),
        ));
    }

    if config.accept.trim().is_empty() {
        return Err(ConfigError::Validation(
            "fetch accept header cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates dispatch configuration
fn validate_dispatch_config(config: &DispatchConfig) -> Result<(), ConfigError> {
    if config.default_concurrency < 1 || config.default_concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "default_concurrency must be between 1 and 1000, got {}",
            config.default_concurrency
        )));
    }

    for (name, limit) in &config.limits {
        if EventKind::from_name(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown event type in dispatch limits: '{}'",
                name
            )));
        }
        if *limit == 0 {
            return Err(ConfigError::Validation(format!(
                "dispatch limit for '{}' must be >= 1",
                name
            )));
        }
    }

    Ok(())
}

/// Validates crawl configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_links == 0 {
        return Err(ConfigError::Validation(
            "max_links must be >= 1".to_string(),
        ));
    }

    if config.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if u64::from(config.stale_after_days) > MAX_DAYS {
        return Err(ConfigError::Validation(format!(
            "stale_after_days must be <= {}",
            MAX_DAYS
        )));
    }

    Ok(())
}
