use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::{
    error::SearchError,
    search::{LocationQuery, RestaurantApi},
};

pub type SharedApi = Arc<dyn RestaurantApi>;

#[derive(Parser, Clone, Debug)]
pub struct ServerArgs {
    #[clap(env, long, default_value_t = 3001)]
    pub port: u16,

    // Comma separated; "*" allows any origin.
    #[clap(env, long, default_value = "*")]
    pub origin_urls: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub location: Option<String>,
    pub query: Option<String>,
    pub radius: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SearchParams {
    fn location_query(&self) -> LocationQuery {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => LocationQuery::Coordinates {
                latitude,
                longitude,
            },
            _ => LocationQuery::Text(self.location.clone().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PhotoParams {
    pub maxwidth: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryRequest {
    #[serde(default)]
    pub address: String,
}

fn error_response(e: SearchError) -> Response {
    let status = match e {
        SearchError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        SearchError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("request failed: {e}");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, SearchError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn search_restaurants(
    Extension(api): Extension<SharedApi>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let term = params.query.clone().unwrap_or_default();
    match api
        .search_places(&params.location_query(), &term, params.radius)
        .await
    {
        Ok(results) => (StatusCode::OK, Json(json!({ "results": results }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn restaurant_details(
    Extension(api): Extension<SharedApi>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(api.place_details(&id).await)
}

async fn restaurant_menu(
    Extension(api): Extension<SharedApi>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(api.menu(&id).await)
}

async fn restaurant_reviews(
    Extension(api): Extension<SharedApi>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(api.reviews(&id).await)
}

async fn restaurant_availability(
    Extension(api): Extension<SharedApi>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(api.availability(&id).await)
}

async fn delivery_estimate(
    Extension(api): Extension<SharedApi>,
    Path(id): Path<String>,
    Json(body): Json<DeliveryRequest>,
) -> impl IntoResponse {
    respond(api.delivery_estimate(&id, &body.address))
}

async fn restaurant_photo(
    Extension(api): Extension<SharedApi>,
    Path(reference): Path<String>,
    Query(params): Query<PhotoParams>,
) -> impl IntoResponse {
    match api.photo(&reference, params.maxwidth).await {
        Ok(photo) => (
            StatusCode::OK,
            [(CONTENT_TYPE, photo.content_type)],
            photo.bytes,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn page_not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "no such endpoint" })),
    )
}

pub fn router(api: SharedApi) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/restaurants", get(search_restaurants))
        .route("/api/restaurants/:id", get(restaurant_details))
        .route("/api/restaurants/:id/menu", get(restaurant_menu))
        .route("/api/restaurants/:id/reviews", get(restaurant_reviews))
        .route(
            "/api/restaurants/:id/availability",
            get(restaurant_availability),
        )
        .route(
            "/api/restaurants/:id/delivery-estimate",
            post(delivery_estimate),
        )
        .route("/api/photos/:reference", get(restaurant_photo))
        .fallback(page_not_found_handler)
        .layer(Extension(api))
}

pub fn cors_layer(origin_urls: &str) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origin_urls.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        let origins = origin_urls
            .split(',')
            .map(|s| s.trim().parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .context("invalid origin in ORIGIN_URLS")?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(allow_origin)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

pub async fn serve(api: SharedApi, args: &ServerArgs) -> anyhow::Result<()> {
    let application = router(api).layer(ServiceBuilder::new().layer(cors_layer(&args.origin_urls)?));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("API server listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(application.into_make_service())
        .await
        .context("Error spinning up the API server")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ClientConfig, ProviderConfig},
        mock_provider::MockProvider,
        search::{SearchClient, SearchContext},
    };
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_with(config: ClientConfig) -> Router {
        let context = SearchContext::new(&config);
        let client = SearchClient::with_transport(config, Arc::new(MockProvider::new()), context);
        router(Arc::new(client))
    }

    fn app() -> Router {
        app_with(ClientConfig::default())
    }

    async fn call(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_search_serves_fallback_results() {
        let (status, body) = call(get_request("/api/restaurants?location=Oakland&query=sushi")).await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["source"], "fallback");
        assert!(results[0]["priceTier"].is_string());
        assert!(results[0]["isOpenNow"].is_boolean());
    }

    #[tokio::test]
    async fn test_bad_search_is_400() {
        let (status, body) = call(get_request("/api/restaurants?query=pizza")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("location"));

        let (status, _) = call(get_request("/api/restaurants?location=SF&radius=90000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_details_and_not_found() {
        let (status, body) = call(get_request("/api/restaurants/fallback-golden-dragon")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Golden Dragon");

        let (status, body) = call(get_request("/api/restaurants/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_menu_reviews_availability() {
        let (status, body) = call(get_request("/api/restaurants/r1/menu")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["restaurantId"], "r1");

        let (status, body) = call(get_request("/api/restaurants/r1/reviews")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reviews"].as_array().unwrap().len(), 3);

        let (status, body) =
            call(get_request("/api/restaurants/fallback-golden-dragon/availability")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isOpenNow"], true);
        assert!(body["nextPickupSlot"].is_string());
    }

    #[tokio::test]
    async fn test_delivery_estimate() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/restaurants/r1/delivery-estimate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"address":"10 Main St"}"#))
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["estimatedDeliveryTime"].as_u64().unwrap() >= 15);
        assert_eq!(body["serviceFee"], 2.49);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/restaurants/r1/delivery-estimate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_photo_is_relayed() {
        let config = ClientConfig {
            places: ProviderConfig::new("http://places.test", "server-key"),
            ..ClientConfig::default()
        };
        let response = app_with(config)
            .oneshot(get_request("/api/photos/ref-roma?maxwidth=200"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/jpeg");
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"jpeg:ref-roma:200");

        // without a places key there is nothing to relay
        let (status, body) = call(get_request("/api/photos/ref-roma")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, body) = call(get_request("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no such endpoint");
    }

    #[test]
    fn test_cors_origins() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("http://localhost:3000, https://example.com").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
