// Restaurant search client: cache -> rate limit -> retrying provider call ->
// normalize -> cache. Places is asked first, the business provider second,
// and the static catalog is the answer of last resort.
//
// Only InvalidParameter and Cancelled reach the caller of a search. Every
// other failure (no key, outage, exhausted retries, provider status errors)
// degrades to fallback data.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    cache::{create_cache_key, CacheStats, ResponseCache},
    config::{ClientConfig, DEFAULT_PHOTO_WIDTH, MAX_PHOTO_WIDTH, MAX_RADIUS_METERS, PHOTO_ROUTE},
    delivery,
    error::{LocationError, SearchError},
    fallback,
    geolocation::{self, FixedLocationProvider, LocationProvider, Position},
    models::{Availability, DeliveryEstimate, Menu, RawMenu, RawReviewPage, ReviewPage},
    normalizer::{Coordinates, Place, PlaceNormalizer, Source},
    rate_limiter::{RateLimitUsage, RateLimiter},
    retry::{ExecutorSnapshot, ResponseCheck, RetryExecutor},
    transport::{HttpTransport, PhotoData, ProviderKind, ProviderRequest, Transport},
};

const DEFAULT_NEARBY_RADIUS_METERS: f64 = 5000.0;
// business search rejects larger radii
const MAX_BUSINESS_RADIUS_METERS: f64 = 40_000.0;
const DETAIL_FIELDS: &str = "place_id,name,rating,user_ratings_total,types,formatted_address,formatted_phone_number,photos,price_level,geometry,opening_hours";
const PICKUP_LEAD_MINUTES: i64 = 20;
const DELIVERY_LEAD_MINUTES: i64 = 45;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LocationQuery {
    Text(String),
    Coordinates { latitude: f64, longitude: f64 },
}

impl From<&str> for LocationQuery {
    fn from(value: &str) -> Self {
        LocationQuery::Text(value.to_string())
    }
}

impl From<String> for LocationQuery {
    fn from(value: String) -> Self {
        LocationQuery::Text(value)
    }
}

impl From<Coordinates> for LocationQuery {
    fn from(c: Coordinates) -> Self {
        LocationQuery::Coordinates {
            latitude: c.latitude,
            longitude: c.longitude,
        }
    }
}

impl From<Position> for LocationQuery {
    fn from(p: Position) -> Self {
        LocationQuery::Coordinates {
            latitude: p.latitude,
            longitude: p.longitude,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedResponse {
    Places(Vec<Place>),
    Place(Place),
    Reviews(ReviewPage),
    Menu(Menu),
}

// Process-wide state, created once and shared by every client built on it.
#[derive(Clone)]
pub struct SearchContext {
    pub cache: Arc<ResponseCache<CachedResponse>>,
    pub limiter: Arc<RateLimiter>,
}

impl SearchContext {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new(config.cache_config.ttl())),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_config.clone())),
        }
    }
}

#[derive(Debug, Default)]
struct SearchCounters {
    searches: AtomicUsize,
    fallbacks_served: AtomicUsize,
    dropped_records: AtomicUsize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub searches: usize,
    pub fallbacks_served: usize,
    pub dropped_records: usize,
    pub executor: ExecutorSnapshot,
    pub cache: CacheStats,
    pub rate_limit: RateLimitUsage,
}

#[async_trait]
pub trait RestaurantApi: Send + Sync + 'static {
    async fn search_places(
        &self,
        location: &LocationQuery,
        term: &str,
        radius_meters: Option<f64>,
    ) -> Result<Vec<Place>, SearchError>;

    async fn place_details(&self, place_id: &str) -> Result<Place, SearchError>;

    async fn reviews(&self, business_id: &str) -> Result<ReviewPage, SearchError>;

    async fn menu(&self, restaurant_id: &str) -> Result<Menu, SearchError>;

    async fn availability(&self, restaurant_id: &str) -> Result<Availability, SearchError>;

    async fn photo(
        &self,
        reference: &str,
        max_width: Option<u32>,
    ) -> Result<PhotoData, SearchError>;

    fn delivery_estimate(
        &self,
        restaurant_id: &str,
        address: &str,
    ) -> Result<DeliveryEstimate, SearchError>;

    fn cancel(&self, request_id: &str) -> bool;

    fn cancel_all(&self) -> usize;

    fn clear_cache(&self, pattern: Option<&str>) -> usize;

    fn stats(&self) -> ClientStats;
}

pub fn validate_search(
    location: &LocationQuery,
    radius_meters: Option<f64>,
) -> Result<(), SearchError> {
    match location {
        LocationQuery::Text(text) if text.trim().is_empty() => {
            return Err(SearchError::InvalidParameter(
                "location must be a non-empty string".to_string(),
            ))
        }
        LocationQuery::Coordinates {
            latitude,
            longitude,
        } if !(latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(latitude)
            && (-180.0..=180.0).contains(longitude)) =>
        {
            return Err(SearchError::InvalidParameter(format!(
                "coordinates out of range: {latitude},{longitude}"
            )))
        }
        _ => {}
    }

    if let Some(radius) = radius_meters {
        if !radius.is_finite() || radius <= 0.0 || radius > MAX_RADIUS_METERS {
            return Err(SearchError::InvalidParameter(format!(
                "radius must be in (0, {MAX_RADIUS_METERS}], got {radius}"
            )));
        }
    }

    Ok(())
}

fn require_id(kind: &str, id: &str) -> Result<(), SearchError> {
    if id.trim().is_empty() {
        Err(SearchError::InvalidParameter(format!(
            "{kind} id must not be empty"
        )))
    } else {
        Ok(())
    }
}

fn accept_any(_: &Value) -> Result<(), SearchError> {
    Ok(())
}

// Places-provider status field to an error. Missing status is treated as OK.
pub fn check_places_status(value: &Value) -> Result<(), SearchError> {
    let status = value.get("status").and_then(Value::as_str).unwrap_or("OK");
    let message = value
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or(status)
        .to_string();

    let code = match status {
        "OK" | "ZERO_RESULTS" => return Ok(()),
        "OVER_QUERY_LIMIT" => 429,
        "REQUEST_DENIED" => 403,
        "INVALID_REQUEST" => 400,
        "NOT_FOUND" => 404,
        _ => 502,
    };
    Err(SearchError::ApiError {
        status: code,
        message,
    })
}

pub struct SearchClient {
    config: ClientConfig,
    context: SearchContext,
    executor: RetryExecutor,
    transport: Arc<dyn Transport>,
    normalizer: PlaceNormalizer,
    location_provider: Arc<dyn LocationProvider>,
    counters: SearchCounters,
    next_request: AtomicU64,
}

impl SearchClient {
    pub fn new(config: ClientConfig) -> Result<Self, SearchError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let context = SearchContext::new(&config);
        Ok(Self::with_transport(config, transport, context))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        context: SearchContext,
    ) -> Self {
        let executor = RetryExecutor::new(
            transport.clone(),
            context.limiter.clone(),
            config.retry_config.clone(),
            config.timeout(),
        );
        let normalizer = PlaceNormalizer::new(PHOTO_ROUTE);

        Self {
            config,
            context,
            executor,
            transport,
            normalizer,
            location_provider: Arc::new(FixedLocationProvider::default()),
            counters: SearchCounters::default(),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn with_location_provider(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.location_provider = provider;
        self
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn next_request_id(&self, operation: &str) -> String {
        format!(
            "{operation}-{}",
            self.next_request.fetch_add(1, Ordering::Relaxed)
        )
    }

    pub fn active_requests(&self) -> Vec<String> {
        self.executor.active_requests()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.context.cache.stats()
    }

    pub async fn get_current_location(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Position, LocationError> {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.geolocation_timeout_ms));
        geolocation::get_current_location(self.location_provider.as_ref(), timeout).await
    }

    fn serve_fallback(&self, term: &str, reason: &str) -> Vec<Place> {
        self.counters
            .fallbacks_served
            .fetch_add(1, Ordering::Relaxed);
        let places = fallback::search_catalog(term);
        info!(
            "serving {} fallback restaurants for '{term}': {reason}",
            places.len()
        );
        places
    }

    fn build_places_request(
        &self,
        location: &LocationQuery,
        term: &str,
        radius_meters: Option<f64>,
    ) -> ProviderRequest {
        match location {
            LocationQuery::Text(text) => {
                let query = if term.is_empty() {
                    format!("restaurants in {}", text.trim())
                } else {
                    format!("{term} in {}", text.trim())
                };
                let request = ProviderRequest::new(ProviderKind::Places, "textsearch/json")
                    .param("query", query)
                    .param("type", "restaurant");
                match radius_meters {
                    Some(radius) => request.param("radius", radius.round() as u64),
                    None => request,
                }
            }
            LocationQuery::Coordinates {
                latitude,
                longitude,
            } => {
                let radius = radius_meters.unwrap_or(DEFAULT_NEARBY_RADIUS_METERS);
                let request = ProviderRequest::new(ProviderKind::Places, "nearbysearch/json")
                    .param("location", format!("{latitude},{longitude}"))
                    .param("radius", radius.round() as u64)
                    .param("type", "restaurant");
                if term.is_empty() {
                    request
                } else {
                    request.param("keyword", term)
                }
            }
        }
    }

    fn build_business_request(
        &self,
        location: &LocationQuery,
        term: &str,
        radius_meters: Option<f64>,
    ) -> ProviderRequest {
        let request = ProviderRequest::new(ProviderKind::Business, "businesses/search")
            .param("categories", "restaurants");
        let request = match location {
            LocationQuery::Text(text) => request.param("location", text.trim()),
            LocationQuery::Coordinates {
                latitude,
                longitude,
            } => request
                .param("latitude", latitude)
                .param("longitude", longitude),
        };
        let request = if term.is_empty() {
            request
        } else {
            request.param("term", term)
        };
        match radius_meters {
            Some(radius) => request.param(
                "radius",
                radius.min(MAX_BUSINESS_RADIUS_METERS).round() as u64,
            ),
            None => request,
        }
    }

    // One provider round trip: call, then normalize the records under `list_key`.
    async fn query_provider(
        &self,
        request_id: &str,
        request: &ProviderRequest,
        check: &ResponseCheck,
        list_key: &str,
        source: Source,
    ) -> Result<Vec<Place>, SearchError> {
        info!("searching {request}");
        let value = self
            .executor
            .execute_checked(request_id, request, check)
            .await?;

        let raw_results = value
            .get(list_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let batch = self.normalizer.normalize_list(raw_results, source);
        self.counters
            .dropped_records
            .fetch_add(batch.dropped, Ordering::Relaxed);
        Ok(batch.places)
    }

    // Search under a caller-chosen request id, so it can be cancelled with `cancel`.
    pub async fn search_places_tracked(
        &self,
        request_id: &str,
        location: &LocationQuery,
        term: &str,
        radius_meters: Option<f64>,
    ) -> Result<Vec<Place>, SearchError> {
        validate_search(location, radius_meters)?;
        self.counters.searches.fetch_add(1, Ordering::Relaxed);

        let term = term.trim();
        let key = create_cache_key(
            "searchPlaces",
            &json!({ "location": location, "term": term, "radius": radius_meters }),
        );

        if let Some(CachedResponse::Places(places)) = self.context.cache.get(&key) {
            return Ok(places);
        }

        // places first, then the business provider, then the static catalog
        let mut attempts: Vec<(ProviderRequest, &ResponseCheck, &str, Source)> = vec![];
        if self.config.places.is_configured() {
            attempts.push((
                self.build_places_request(location, term, radius_meters),
                &check_places_status as &ResponseCheck,
                "results",
                Source::Places,
            ));
        }
        if self.config.business.is_configured() {
            attempts.push((
                self.build_business_request(location, term, radius_meters),
                &accept_any as &ResponseCheck,
                "businesses",
                Source::Business,
            ));
        }

        let mut reason = "no search provider configured".to_string();
        for (request, check, list_key, source) in &attempts {
            match self
                .query_provider(request_id, request, *check, list_key, *source)
                .await
            {
                Ok(places) if !places.is_empty() => {
                    debug!("caching {} places for {key}", places.len());
                    self.context
                        .cache
                        .set(key, CachedResponse::Places(places.clone()));
                    return Ok(places);
                }
                Ok(_) => reason = format!("{} provider returned no results", request.provider),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    info!("{} search failed: {e}", request.provider);
                    reason = e.to_string();
                }
            }
        }

        Ok(self.serve_fallback(term, &reason))
    }
}

#[async_trait]
impl RestaurantApi for SearchClient {
    async fn search_places(
        &self,
        location: &LocationQuery,
        term: &str,
        radius_meters: Option<f64>,
    ) -> Result<Vec<Place>, SearchError> {
        let request_id = self.next_request_id("search");
        self.search_places_tracked(&request_id, location, term, radius_meters)
            .await
    }

    async fn place_details(&self, place_id: &str) -> Result<Place, SearchError> {
        require_id("place", place_id)?;
        let key = create_cache_key("placeDetails", &json!({ "placeId": place_id }));
        if let Some(CachedResponse::Place(place)) = self.context.cache.get(&key) {
            return Ok(place);
        }

        if self.config.places.is_configured() {
            let request = ProviderRequest::new(ProviderKind::Places, "details/json")
                .param("place_id", place_id)
                .param("fields", DETAIL_FIELDS);
            let request_id = self.next_request_id("details");

            match self
                .executor
                .execute_checked(&request_id, &request, &check_places_status)
                .await
            {
                Ok(value) => {
                    if let Some(place) = value
                        .get("result")
                        .and_then(|raw| self.normalizer.normalize_one(raw, Source::Places))
                    {
                        self.context
                            .cache
                            .set(key, CachedResponse::Place(place.clone()));
                        return Ok(place);
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => info!("details for {place_id} unavailable: {e}"),
            }
        }

        self.counters
            .fallbacks_served
            .fetch_add(1, Ordering::Relaxed);
        fallback::find_place(place_id)
            .ok_or_else(|| SearchError::NotFound(format!("restaurant {place_id}")))
    }

    async fn reviews(&self, business_id: &str) -> Result<ReviewPage, SearchError> {
        require_id("business", business_id)?;
        let key = create_cache_key("reviews", &json!({ "businessId": business_id }));
        if let Some(CachedResponse::Reviews(page)) = self.context.cache.get(&key) {
            return Ok(page);
        }

        if self.config.business.is_configured() {
            let request = ProviderRequest::new(
                ProviderKind::Business,
                format!("businesses/{business_id}/reviews"),
            );
            let request_id = self.next_request_id("reviews");

            match self.executor.execute(&request_id, &request).await {
                Ok(value) => match serde_json::from_value::<RawReviewPage>(value) {
                    Ok(raw) => {
                        let page = raw.into_page();
                        self.context
                            .cache
                            .set(key, CachedResponse::Reviews(page.clone()));
                        return Ok(page);
                    }
                    Err(e) => info!("reviews for {business_id} undecodable: {e}"),
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => info!("reviews for {business_id} unavailable: {e}"),
            }
        }

        self.counters
            .fallbacks_served
            .fetch_add(1, Ordering::Relaxed);
        Ok(fallback::sample_reviews(business_id))
    }

    async fn menu(&self, restaurant_id: &str) -> Result<Menu, SearchError> {
        require_id("restaurant", restaurant_id)?;
        let key = create_cache_key("menu", &json!({ "restaurantId": restaurant_id }));
        if let Some(CachedResponse::Menu(menu)) = self.context.cache.get(&key) {
            return Ok(menu);
        }

        if self.config.menu.is_configured() {
            let request = ProviderRequest::new(
                ProviderKind::Menu,
                format!("restaurants/{restaurant_id}/menu"),
            );
            let request_id = self.next_request_id("menu");

            match self.executor.execute(&request_id, &request).await {
                Ok(value) => match serde_json::from_value::<RawMenu>(value) {
                    Ok(raw) => {
                        let menu = raw.into_menu(restaurant_id);
                        self.context
                            .cache
                            .set(key, CachedResponse::Menu(menu.clone()));
                        return Ok(menu);
                    }
                    Err(e) => info!("menu for {restaurant_id} undecodable: {e}"),
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => info!("menu for {restaurant_id} unavailable: {e}"),
            }
        }

        self.counters
            .fallbacks_served
            .fetch_add(1, Ordering::Relaxed);
        Ok(fallback::sample_menu(restaurant_id))
    }

    async fn availability(&self, restaurant_id: &str) -> Result<Availability, SearchError> {
        let place = self.place_details(restaurant_id).await?;
        let now = Utc::now();
        let slot = |minutes: i64| {
            place.is_open_now.then(|| {
                (now + chrono::Duration::minutes(minutes)).to_rfc3339_opts(SecondsFormat::Secs, true)
            })
        };

        Ok(Availability {
            restaurant_id: place.id.clone(),
            is_open_now: place.is_open_now,
            next_pickup_slot: slot(PICKUP_LEAD_MINUTES),
            next_delivery_slot: slot(DELIVERY_LEAD_MINUTES),
        })
    }

    // Relays a place photo in a single attempt.
    async fn photo(
        &self,
        reference: &str,
        max_width: Option<u32>,
    ) -> Result<PhotoData, SearchError> {
        require_id("photo", reference)?;
        if !self.config.places.is_configured() {
            return Err(SearchError::NotFound(format!("photo {reference}")));
        }

        let width = max_width
            .unwrap_or(DEFAULT_PHOTO_WIDTH)
            .clamp(1, MAX_PHOTO_WIDTH);
        self.context.limiter.acquire().await?;
        match tokio::time::timeout(
            self.config.timeout(),
            self.transport.get_photo(reference, width),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(self.config.timeout_ms)),
        }
    }

    fn delivery_estimate(
        &self,
        restaurant_id: &str,
        address: &str,
    ) -> Result<DeliveryEstimate, SearchError> {
        delivery::estimate_delivery(restaurant_id, address)
    }

    fn cancel(&self, request_id: &str) -> bool {
        self.executor.cancel(request_id)
    }

    fn cancel_all(&self) -> usize {
        self.executor.cancel_all()
    }

    fn clear_cache(&self, pattern: Option<&str>) -> usize {
        self.context.cache.clear(pattern)
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            searches: self.counters.searches.load(Ordering::Relaxed),
            fallbacks_served: self.counters.fallbacks_served.load(Ordering::Relaxed),
            dropped_records: self.counters.dropped_records.load(Ordering::Relaxed),
            executor: self.executor.stats(),
            cache: self.context.cache.stats(),
            rate_limit: self.context.limiter.usage(),
        }
    }
}
