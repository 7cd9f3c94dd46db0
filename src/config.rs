// Client configuration: provider endpoints, keys, limits and timeouts

use std::{env, str::FromStr, time::Duration};

use tracing::{debug, warn};

use crate::error::ConfigError;

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
pub const DEFAULT_YELP_BASE_URL: &str = "https://api.yelp.com/v3";
pub const DEFAULT_MENU_BASE_URL: &str = "https://api.chownow.com/api";
pub const PHOTO_PLACEHOLDER: &str = "🍽️";
pub const MAX_RADIUS_METERS: f64 = 50_000.0;
// Place images point here; the server relays them so the places key never leaves it.
pub const PHOTO_ROUTE: &str = "/api/photos";
pub const DEFAULT_PHOTO_WIDTH: u32 = 400;
pub const MAX_PHOTO_WIDTH: u32 = 1600;

// Endpoint and credentials for a single upstream provider.
// An empty api key means the provider is not configured.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

impl ProviderConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.base_url.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests_per_second: u32,
    pub max_requests_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            max_requests_per_day: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub places: ProviderConfig,
    pub business: ProviderConfig,
    pub menu: ProviderConfig,
    pub timeout_ms: u64,
    pub geolocation_timeout_ms: u64,
    pub retry_config: RetryConfig,
    pub rate_limit_config: RateLimitConfig,
    pub cache_config: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            places: ProviderConfig::new(DEFAULT_PLACES_BASE_URL, ""),
            business: ProviderConfig::new(DEFAULT_YELP_BASE_URL, ""),
            menu: ProviderConfig::new(DEFAULT_MENU_BASE_URL, ""),
            timeout_ms: 15_000,
            geolocation_timeout_ms: 10_000,
            retry_config: RetryConfig::default(),
            rate_limit_config: RateLimitConfig::default(),
            cache_config: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    // Defaults overlaid with whatever the environment provides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let provider = |url_key: &str, key_key: &str, current: &ProviderConfig| {
            let base_url = lookup(url_key).unwrap_or_else(|| current.base_url.clone());
            let api_key = lookup(key_key).unwrap_or_default();
            ProviderConfig::new(&base_url, &api_key)
        };

        config.places = provider("PLACES_BASE_URL", "GOOGLE_PLACES_API_KEY", &config.places);
        config.business = provider("YELP_BASE_URL", "YELP_API_KEY", &config.business);
        config.menu = provider("MENU_BASE_URL", "MENU_API_KEY", &config.menu);

        for (name, provider) in [
            ("places", &config.places),
            ("business", &config.business),
            ("menu", &config.menu),
        ] {
            if !provider.is_configured() {
                warn!("{name} provider has no api key, serving fallback data");
            }
        }

        if let Some(v) = parse_var(&lookup, "REQUEST_TIMEOUT_MS")? {
            config.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "GEOLOCATION_TIMEOUT_MS")? {
            config.geolocation_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RATE_LIMIT_PER_SECOND")? {
            config.rate_limit_config.max_requests_per_second = v;
        }
        if let Some(v) = parse_var(&lookup, "RATE_LIMIT_PER_DAY")? {
            config.rate_limit_config.max_requests_per_day = v;
        }
        if let Some(v) = parse_var(&lookup, "CACHE_TTL_SECONDS")? {
            config.cache_config.ttl_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "RETRY_MAX_ATTEMPTS")? {
            config.retry_config.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "RETRY_BASE_DELAY_MS")? {
            config.retry_config.base_delay_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_config.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit_config.max_requests_per_second == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_PER_SECOND".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REQUEST_TIMEOUT_MS".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => {
            let value = raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            debug!("{key} overridden from environment");
            Ok(Some(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_ms, 15_000);
        assert_eq!(config.geolocation_timeout_ms, 10_000);
        assert_eq!(config.retry_config.max_attempts, 3);
        assert_eq!(config.retry_config.base_delay_ms, 1000);
        assert_eq!(config.cache_config.ttl(), Duration::from_secs(300));
        assert!(!config.places.is_configured());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GOOGLE_PLACES_API_KEY", "abc"),
            ("PLACES_BASE_URL", "http://localhost:9999/place/"),
            ("RATE_LIMIT_PER_SECOND", "2"),
            ("CACHE_TTL_SECONDS", "60"),
        ]))
        .unwrap();

        assert!(config.places.is_configured());
        assert_eq!(config.places.base_url, "http://localhost:9999/place");
        assert_eq!(config.rate_limit_config.max_requests_per_second, 2);
        assert_eq!(config.cache_config.ttl_seconds, 60);
        assert!(!config.business.is_configured());
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("RATE_LIMIT_PER_DAY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RATE_LIMIT_PER_DAY"));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("RETRY_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
