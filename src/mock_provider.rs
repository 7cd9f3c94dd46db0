// Scriptable in-process provider for tests and offline demos.
// Counts calls, fails on demand, delays responses and serves canned payloads.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU16, AtomicU64, AtomicU8, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{
    error::SearchError,
    transport::{photo_request, PhotoData, ProviderRequest, Transport},
};

#[derive(Debug, Clone, Copy)]
pub enum ProviderMode {
    Normal,
    PartialOutage,
    CompleteOutage,
}

pub struct MockProvider {
    mode: AtomicU8,
    request_count: AtomicUsize,
    fail_next_requests: AtomicUsize,
    fail_status: AtomicU16,
    delay_ms: AtomicU64,
    responses: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(0),
            request_count: AtomicUsize::new(0),
            fail_next_requests: AtomicUsize::new(0),
            fail_status: AtomicU16::new(500),
            delay_ms: AtomicU64::new(0),
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: ProviderMode) {
        let mode_value = match mode {
            ProviderMode::Normal => 0,
            ProviderMode::PartialOutage => 1,
            ProviderMode::CompleteOutage => 2,
        };
        self.mode.store(mode_value, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    // The next `count` calls fail with a 500.
    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_with_status(count, 500);
    }

    pub fn fail_next_with_status(&self, count: usize, status: u16) {
        self.fail_status.store(status, Ordering::SeqCst);
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn add_response(&self, path: &str, response: Value) {
        self.responses.lock().insert(path.to_string(), response);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }
}

impl MockProvider {
    // Shared by every call: count, log, then apply outage mode, delay and scripted failures.
    async fn simulate(&self, request: &ProviderRequest) -> Result<(), SearchError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        match self.mode.load(Ordering::SeqCst) {
            2 => return Err(SearchError::Network("Service unavailable".to_string())),
            1 if rand::random::<f32>() < 0.5 => {
                return Err(SearchError::ApiError {
                    status: 503,
                    message: "Service temporarily unavailable".to_string(),
                })
            }
            _ => {}
        }

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let remaining = self.fail_next_requests.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_requests
                .store(remaining - 1, Ordering::SeqCst);
            let status = self.fail_status.load(Ordering::SeqCst);
            return Err(SearchError::ApiError {
                status,
                message: format!("scripted failure ({status})"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockProvider {
    async fn get_json(&self, request: &ProviderRequest) -> Result<Value, SearchError> {
        self.simulate(request).await?;

        self.responses
            .lock()
            .get(&request.path)
            .cloned()
            .ok_or_else(|| SearchError::ApiError {
                status: 404,
                message: format!("no canned response for {}", request.path),
            })
    }

    async fn get_photo(&self, reference: &str, max_width: u32) -> Result<PhotoData, SearchError> {
        self.simulate(&photo_request(reference, max_width)).await?;

        Ok(PhotoData {
            content_type: "image/jpeg".to_string(),
            bytes: format!("jpeg:{reference}:{max_width}").into_bytes(),
        })
    }
}

// Two places-provider records in the textsearch shape.
pub fn sample_places_payload() -> Value {
    json!({
        "status": "OK",
        "results": [
            {
                "place_id": "ChIJ-trattoria",
                "name": "Trattoria Roma",
                "rating": 4.6,
                "user_ratings_total": 812,
                "types": ["restaurant", "italian_restaurant", "food", "point_of_interest"],
                "formatted_address": "120 Market St, San Francisco, CA 94105, USA",
                "price_level": 2,
                "photos": [{ "photo_reference": "ref-roma", "height": 400, "width": 600 }],
                "geometry": { "location": { "lat": 37.7936, "lng": -122.3965 } },
                "opening_hours": { "open_now": true }
            },
            {
                "place_id": "ChIJ-noodle",
                "name": "Golden Noodle House",
                "rating": 4.1,
                "user_ratings_total": 245,
                "types": ["restaurant", "chinese_restaurant", "meal_takeaway"],
                "formatted_address": "55 Grant Ave, San Francisco, CA 94108, USA",
                "price_level": 1,
                "geometry": { "location": { "lat": 37.7880, "lng": -122.4058 } },
                "opening_hours": { "open_now": false }
            }
        ]
    })
}

// One business-provider record in the businesses/search shape.
pub fn sample_business_payload() -> Value {
    json!({
        "total": 1,
        "businesses": [
            {
                "id": "biz-luigis",
                "name": "Luigi's Pizzeria",
                "rating": 4.5,
                "review_count": 97,
                "categories": [
                    { "alias": "pizza", "title": "Pizza" },
                    { "alias": "italian", "title": "Italian" }
                ],
                "location": { "address1": "8 Congress Ave", "city": "Austin", "state": "TX", "zip_code": "78701" },
                "display_phone": "(512) 555-0100",
                "image_url": "https://img.example.com/luigis.jpg",
                "price": "$$",
                "coordinates": { "latitude": 30.2642, "longitude": -97.7433 },
                "is_closed": false
            }
        ]
    })
}
