// Maps provider-specific JSON into the canonical Place shape.
//
// Normalization is best-effort per record: a malformed record is dropped and
// counted, never allowed to fail the whole batch. Every field of a returned
// Place is populated, absent upstream data becomes its documented default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::PHOTO_PLACEHOLDER;

const MAX_CATEGORIES: usize = 3;

// Provider type tags and business aliases to display labels. Anything else is dropped.
const CATEGORY_LABELS: &[(&str, &str)] = &[
    ("restaurant", "Restaurant"),
    ("cafe", "Cafe"),
    ("cafes", "Cafe"),
    ("bar", "Bar"),
    ("bars", "Bar"),
    ("bakery", "Bakery"),
    ("bakeries", "Bakery"),
    ("meal_takeaway", "Takeout"),
    ("meal_delivery", "Delivery"),
    ("coffee_shop", "Coffee"),
    ("coffee", "Coffee"),
    ("italian_restaurant", "Italian"),
    ("italian", "Italian"),
    ("pizza_restaurant", "Pizza"),
    ("pizza", "Pizza"),
    ("chinese_restaurant", "Chinese"),
    ("chinese", "Chinese"),
    ("mexican_restaurant", "Mexican"),
    ("mexican", "Mexican"),
    ("japanese_restaurant", "Japanese"),
    ("japanese", "Japanese"),
    ("sushi_restaurant", "Sushi"),
    ("sushi", "Sushi"),
    ("indian_restaurant", "Indian"),
    ("indpak", "Indian"),
    ("thai_restaurant", "Thai"),
    ("thai", "Thai"),
    ("vegetarian_restaurant", "Vegetarian"),
    ("vegetarian", "Vegetarian"),
    ("seafood_restaurant", "Seafood"),
    ("seafood", "Seafood"),
    ("steak_house", "Steakhouse"),
    ("steak", "Steakhouse"),
    ("hamburger_restaurant", "Burgers"),
    ("burgers", "Burgers"),
    ("breakfast_restaurant", "Breakfast"),
    ("brunch_restaurant", "Brunch"),
    ("breakfast_brunch", "Breakfast & Brunch"),
    ("fast_food_restaurant", "Fast Food"),
    ("hotdogs", "Fast Food"),
    ("ice_cream_shop", "Ice Cream"),
    ("icecream", "Ice Cream"),
];

pub fn category_label(tag: &str) -> Option<&'static str> {
    CATEGORY_LABELS
        .iter()
        .find(|(k, _)| *k == tag)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceTier {
    #[serde(rename = "$")]
    Inexpensive,
    #[default]
    #[serde(rename = "$$")]
    Moderate,
    #[serde(rename = "$$$")]
    Expensive,
    #[serde(rename = "$$$$")]
    VeryExpensive,
}

impl PriceTier {
    // 0 and 1 both map to "$"
    pub fn from_level(level: i64) -> Self {
        match level {
            0 | 1 => PriceTier::Inexpensive,
            2 => PriceTier::Moderate,
            3 => PriceTier::Expensive,
            4 => PriceTier::VeryExpensive,
            _ => PriceTier::default(),
        }
    }

    pub fn from_symbol(symbol: &str) -> Self {
        match symbol.trim() {
            "$" => PriceTier::Inexpensive,
            "$$" => PriceTier::Moderate,
            "$$$" => PriceTier::Expensive,
            "$$$$" => PriceTier::VeryExpensive,
            _ => PriceTier::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Inexpensive => "$",
            PriceTier::Moderate => "$$",
            PriceTier::Expensive => "$$$",
            PriceTier::VeryExpensive => "$$$$",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Places,
    Business,
    Menu,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub review_count: u32,
    pub categories: Vec<String>,
    pub location: Address,
    pub phone: String,
    pub image: String,
    pub price_tier: PriceTier,
    pub coordinates: Option<Coordinates>,
    pub is_open_now: bool,
    pub source: Source,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub places: Vec<Place>,
    pub dropped: usize,
}

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

fn is_zip(token: &str) -> bool {
    let (five, plus_four) = match token.split_once('-') {
        Some((a, b)) => (a, Some(b)),
        None => (token, None),
    };
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    digits(five, 5) && plus_four.map_or(true, |p| digits(p, 4))
}

fn is_state(token: &str) -> bool {
    token.len() == 2 && token.bytes().all(|b| b.is_ascii_uppercase())
}

// "CA 94105" -> ("CA", "94105"); an unparseable part yields empty strings
fn parse_state_zip(part: &str) -> Option<(String, String)> {
    let mut tokens = part.split_whitespace();
    let state = tokens.next().filter(|t| is_state(t))?;
    let zip = tokens.next().filter(|t| is_zip(t)).unwrap_or("");
    Some((state.to_string(), zip.to_string()))
}

fn looks_like_country(part: &str) -> bool {
    !part.bytes().any(|b| b.is_ascii_digit()) && parse_state_zip(part).is_none()
}

// Positional split of a single formatted address line on ", ".
// Works for "street, city, ST zip[, country]"; anything else is best-effort.
pub fn parse_address(formatted: &str) -> Address {
    let mut parts: Vec<&str> = formatted
        .split(", ")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    // trailing country, only when the part before it is a state/zip
    let n = parts.len();
    if n >= 3 && looks_like_country(parts[n - 1]) && parse_state_zip(parts[n - 2]).is_some() {
        parts.pop();
    }

    match parts.len() {
        0 => Address::default(),
        1 => Address {
            address_line: parts[0].to_string(),
            ..Default::default()
        },
        2 => match parse_state_zip(parts[1]) {
            Some((state, zip_code)) => Address {
                address_line: String::new(),
                city: parts[0].to_string(),
                state,
                zip_code,
            },
            None => Address {
                address_line: parts[0].to_string(),
                city: parts[1].to_string(),
                ..Default::default()
            },
        },
        n => {
            let (state, zip_code) = parse_state_zip(parts[n - 1]).unwrap_or_default();
            Address {
                address_line: parts[..n - 2].join(", "),
                city: parts[n - 2].to_string(),
                state,
                zip_code,
            }
        }
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn rating_of(value: Option<&Value>) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|r| r.is_finite())
        .map(|r| r.clamp(0.0, 5.0))
        .unwrap_or(0.0)
}

fn count_of(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .map(|c| c.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

fn collect_categories<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut categories: Vec<String> = Vec::with_capacity(MAX_CATEGORIES);
    for label in tags.filter_map(category_label) {
        if categories.len() == MAX_CATEGORIES {
            break;
        }
        if !categories.iter().any(|c| c == label) {
            categories.push(label.to_string());
        }
    }
    categories
}

fn coordinates_of(value: Option<&Value>, lat_key: &str, lng_key: &str) -> Option<Coordinates> {
    let obj = value?.as_object()?;
    Some(Coordinates {
        latitude: obj.get(lat_key)?.as_f64()?,
        longitude: obj.get(lng_key)?.as_f64()?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct PlaceNormalizer {
    photo_route: String,
}

impl PlaceNormalizer {
    pub fn new(photo_route: &str) -> Self {
        Self {
            photo_route: photo_route.trim_end_matches('/').to_string(),
        }
    }

    pub fn normalize_one(&self, raw: &Value, source: Source) -> Option<Place> {
        let result = match source {
            Source::Business => self.map_business_record(raw),
            Source::Places | Source::Menu | Source::Fallback => {
                self.map_places_record(raw, source)
            }
        };

        match result {
            Ok(place) => Some(place),
            Err(e) => {
                warn!("dropping malformed {source:?} record: {e}");
                None
            }
        }
    }

    pub fn normalize_list(&self, raw_results: &[Value], source: Source) -> NormalizedBatch {
        let places: Vec<Place> = raw_results
            .iter()
            .filter_map(|raw| self.normalize_one(raw, source))
            .collect();
        let dropped = raw_results.len() - places.len();

        if dropped > 0 {
            warn!(
                "{dropped} of {} {source:?} records dropped during normalization",
                raw_results.len()
            );
        }

        NormalizedBatch { places, dropped }
    }

    fn photo_url(&self, reference: &str) -> String {
        format!("{}/{reference}", self.photo_route)
    }

    fn map_places_record(&self, raw: &Value, source: Source) -> Result<Place, NormalizeError> {
        let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
        let id = str_field(obj, "place_id").ok_or(NormalizeError::MissingField("place_id"))?;
        let name = str_field(obj, "name").ok_or(NormalizeError::MissingField("name"))?;

        let categories = obj
            .get("types")
            .and_then(Value::as_array)
            .map(|types| collect_categories(types.iter().filter_map(Value::as_str)))
            .unwrap_or_default();

        let location = str_field(obj, "formatted_address")
            .or_else(|| str_field(obj, "vicinity"))
            .map(parse_address)
            .unwrap_or_default();

        let phone = str_field(obj, "formatted_phone_number")
            .or_else(|| str_field(obj, "international_phone_number"))
            .unwrap_or_default();

        let image = obj
            .get("photos")
            .and_then(Value::as_array)
            .and_then(|photos| photos.first())
            .and_then(|photo| photo.get("photo_reference"))
            .and_then(Value::as_str)
            .map(|reference| self.photo_url(reference))
            .unwrap_or_else(|| PHOTO_PLACEHOLDER.to_string());

        let price_tier = obj
            .get("price_level")
            .and_then(Value::as_i64)
            .map(PriceTier::from_level)
            .unwrap_or_default();

        let is_open_now = ["opening_hours", "current_opening_hours"]
            .iter()
            .find_map(|key| obj.get(*key)?.get("open_now")?.as_bool())
            .unwrap_or(false);

        Ok(Place {
            id: id.to_string(),
            name: name.to_string(),
            rating: rating_of(obj.get("rating")),
            review_count: count_of(obj.get("user_ratings_total")),
            categories,
            location,
            phone: phone.to_string(),
            image,
            price_tier,
            coordinates: coordinates_of(
                obj.get("geometry").and_then(|g| g.get("location")),
                "lat",
                "lng",
            ),
            is_open_now,
            source,
        })
    }

    fn map_business_record(&self, raw: &Value) -> Result<Place, NormalizeError> {
        let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
        let id = str_field(obj, "id").ok_or(NormalizeError::MissingField("id"))?;
        let name = str_field(obj, "name").ok_or(NormalizeError::MissingField("name"))?;

        let categories = obj
            .get("categories")
            .and_then(Value::as_array)
            .map(|cats| {
                collect_categories(
                    cats.iter()
                        .filter_map(|c| c.get("alias").and_then(Value::as_str)),
                )
            })
            .unwrap_or_default();

        let location = obj
            .get("location")
            .and_then(Value::as_object)
            .map(|loc| {
                let field = |key: &str| str_field(loc, key).unwrap_or_default().to_string();
                Address {
                    address_line: field("address1"),
                    city: field("city"),
                    state: field("state"),
                    zip_code: Some(field("zip_code"))
                        .filter(|z| is_zip(z))
                        .unwrap_or_default(),
                }
            })
            .unwrap_or_default();

        let phone = str_field(obj, "display_phone")
            .or_else(|| str_field(obj, "phone"))
            .unwrap_or_default();

        let image = str_field(obj, "image_url")
            .map(str::to_string)
            .unwrap_or_else(|| PHOTO_PLACEHOLDER.to_string());

        let price_tier = str_field(obj, "price")
            .map(PriceTier::from_symbol)
            .unwrap_or_default();

        let is_open_now = obj
            .get("hours")
            .and_then(Value::as_array)
            .and_then(|hours| hours.first())
            .and_then(|h| h.get("is_open_now"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Place {
            id: id.to_string(),
            name: name.to_string(),
            rating: rating_of(obj.get("rating")),
            review_count: count_of(obj.get("review_count")),
            categories,
            location,
            phone: phone.to_string(),
            image,
            price_tier,
            coordinates: coordinates_of(obj.get("coordinates"), "latitude", "longitude"),
            is_open_now,
            source: Source::Business,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PHOTO_ROUTE;
    use crate::mock_provider::sample_places_payload;
    use serde_json::json;

    fn normalizer() -> PlaceNormalizer {
        PlaceNormalizer::new(PHOTO_ROUTE)
    }

    #[test]
    fn test_full_places_record() {
        let payload = sample_places_payload();
        let place = normalizer()
            .normalize_one(&payload["results"][0], Source::Places)
            .unwrap();

        assert_eq!(place.id, "ChIJ-trattoria");
        assert_eq!(place.rating, 4.6);
        assert_eq!(place.review_count, 812);
        assert_eq!(place.categories, vec!["Restaurant", "Italian"]);
        assert_eq!(place.location.city, "San Francisco");
        assert_eq!(place.location.state, "CA");
        assert_eq!(place.location.zip_code, "94105");
        assert_eq!(place.location.address_line, "120 Market St");
        assert_eq!(place.price_tier, PriceTier::Moderate);
        assert_eq!(place.image, "/api/photos/ref-roma");
        assert!(place.is_open_now);
        assert_eq!(
            place.coordinates,
            Some(Coordinates {
                latitude: 37.7936,
                longitude: -122.3965
            })
        );
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = json!({ "place_id": "p1", "name": "Bare Bones Diner" });
        let place = normalizer().normalize_one(&raw, Source::Places).unwrap();

        assert_eq!(place.rating, 0.0);
        assert_eq!(place.review_count, 0);
        assert_eq!(place.image, PHOTO_PLACEHOLDER);
        assert!(!place.is_open_now);
        assert_eq!(place.price_tier, PriceTier::Moderate);
        assert_eq!(place.coordinates, None);
        assert_eq!(place.location, Address::default());
        assert_eq!(place.phone, "");
        assert!(place.categories.is_empty());
    }

    #[test]
    fn test_price_levels() {
        let tiers: Vec<&str> = [0, 1, 2, 3, 4, 5, -1]
            .iter()
            .map(|l| PriceTier::from_level(*l).as_str())
            .collect();
        assert_eq!(tiers, vec!["$", "$", "$$", "$$$", "$$$$", "$$", "$$"]);
        assert_eq!(PriceTier::from_symbol("$$$"), PriceTier::Expensive);
        assert_eq!(PriceTier::from_symbol("cheap"), PriceTier::Moderate);
    }

    #[test]
    fn test_categories_filtered_and_capped() {
        let raw = json!({
            "place_id": "p1",
            "name": "Everything Place",
            "types": ["point_of_interest", "restaurant", "cafe", "restaurant", "bar", "bakery", "food"]
        });
        let place = normalizer().normalize_one(&raw, Source::Places).unwrap();
        assert_eq!(place.categories, vec!["Restaurant", "Cafe", "Bar"]);
    }

    #[test]
    fn test_malformed_records_are_dropped_and_counted() {
        let payload = sample_places_payload();
        let raw = vec![
            payload["results"][0].clone(),
            json!("not an object"),
            json!({ "name": "No Id Grill" }),
            payload["results"][1].clone(),
            json!(null),
        ];

        let batch = normalizer().normalize_list(&raw, Source::Places);
        assert_eq!(batch.places.len(), 2);
        assert_eq!(batch.dropped, 3);
    }

    #[test]
    fn test_address_heuristic() {
        let full = parse_address("1 Ferry Building, Suite 7, San Francisco, CA 94111-1234, USA");
        assert_eq!(full.address_line, "1 Ferry Building, Suite 7");
        assert_eq!(full.city, "San Francisco");
        assert_eq!(full.zip_code, "94111-1234");

        let no_country = parse_address("500 Pine St, Seattle, WA 98101");
        assert_eq!(no_country.city, "Seattle");
        assert_eq!(no_country.state, "WA");
        assert_eq!(no_country.zip_code, "98101");

        let vicinity = parse_address("55 Grant Ave, San Francisco");
        assert_eq!(vicinity.address_line, "55 Grant Ave");
        assert_eq!(vicinity.city, "San Francisco");
        assert_eq!(vicinity.state, "");

        let bad_zip = parse_address("9 Elm St, Springfield, IL 6270, USA");
        assert_eq!(bad_zip.state, "IL");
        assert_eq!(bad_zip.zip_code, "");

        assert_eq!(parse_address(""), Address::default());
    }

    #[test]
    fn test_business_record() {
        let raw = json!({
            "id": "yelp-123",
            "name": "Luigi's",
            "rating": 4.5,
            "review_count": 97,
            "categories": [
                { "alias": "italian", "title": "Italian" },
                { "alias": "wine_bars", "title": "Wine Bars" },
                { "alias": "pizza", "title": "Pizza" }
            ],
            "location": { "address1": "8 Main St", "city": "Austin", "state": "TX", "zip_code": "78701" },
            "display_phone": "(512) 555-0100",
            "image_url": "https://img.example.com/luigi.jpg",
            "price": "$$$",
            "coordinates": { "latitude": 30.26, "longitude": -97.74 },
            "hours": [{ "is_open_now": true }]
        });

        let place = normalizer().normalize_one(&raw, Source::Business).unwrap();
        assert_eq!(place.categories, vec!["Italian", "Pizza"]);
        assert_eq!(place.location.city, "Austin");
        assert_eq!(place.price_tier, PriceTier::Expensive);
        assert_eq!(place.review_count, 97);
        assert!(place.is_open_now);
        assert_eq!(place.source, Source::Business);
    }

    #[test]
    fn test_place_serializes_camel_case() {
        let raw = json!({ "place_id": "p1", "name": "Diner", "price_level": 4 });
        let place = normalizer().normalize_one(&raw, Source::Places).unwrap();
        let value = serde_json::to_value(&place).unwrap();

        assert_eq!(value["priceTier"], "$$$$");
        assert_eq!(value["reviewCount"], 0);
        assert_eq!(value["isOpenNow"], false);
        assert_eq!(value["coordinates"], Value::Null);
        assert_eq!(value["source"], "places");
    }
}
