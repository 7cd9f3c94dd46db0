// Restaurant search client: TTL cache, rate limiting, retrying provider
// calls, response normalization and a static fallback catalog, plus a thin
// HTTP surface over it.

pub mod cache;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fallback;
pub mod geolocation;
pub mod mock_provider;
pub mod models;
pub mod normalizer;
pub mod rate_limiter;
pub mod retry;
pub mod search;
pub mod server;
pub mod transport;

// Re-export key types for convenience
pub use cache::{create_cache_key, CacheStats, ResponseCache};
pub use config::ClientConfig;
pub use error::{ConfigError, LocationError, SearchError};
pub use normalizer::{Place, PlaceNormalizer, PriceTier, Source};
pub use rate_limiter::RateLimiter;
pub use retry::RetryExecutor;
pub use search::{ClientStats, LocationQuery, RestaurantApi, SearchClient, SearchContext};
pub use transport::{HttpTransport, ProviderRequest, Transport};
