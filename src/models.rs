// Reviews, menus, availability and delivery estimates, plus the raw provider
// shapes they are decoded from.

use serde::{Deserialize, Serialize};

use crate::normalizer::Source;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub rating: f64,
    pub text: String,
    pub user_name: String,
    pub time_created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<Review>,
    pub total: u32,
    pub possible_languages: Vec<String>,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub allergens: Vec<String>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub restaurant_id: String,
    pub categories: Vec<MenuCategory>,
    pub source: Source,
}

impl Menu {
    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub restaurant_id: String,
    pub is_open_now: bool,
    pub next_pickup_slot: Option<String>,
    pub next_delivery_slot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub estimated_delivery_time: u32,
    pub estimated_distance: f64,
    pub delivery_fee: f64,
    pub service_fee: f64,
    pub taxes: f64,
}

// Business-reviews provider payload.
#[derive(Debug, Deserialize)]
pub struct RawReviewPage {
    #[serde(default)]
    pub reviews: Vec<RawReview>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub possible_languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<RawReviewUser>,
    #[serde(default)]
    pub time_created: String,
}

#[derive(Debug, Deserialize)]
pub struct RawReviewUser {
    #[serde(default)]
    pub name: String,
}

impl RawReviewPage {
    pub fn into_page(self) -> ReviewPage {
        let reviews: Vec<Review> = self
            .reviews
            .into_iter()
            .map(|r| Review {
                id: r.id,
                rating: r.rating.unwrap_or(0.0).clamp(0.0, 5.0),
                text: r.text,
                user_name: r.user.map(|u| u.name).unwrap_or_default(),
                time_created: r.time_created,
            })
            .collect();

        ReviewPage {
            total: self.total.unwrap_or(reviews.len() as u32),
            reviews,
            possible_languages: self.possible_languages,
            source: Source::Business,
        }
    }
}

// Menu provider payload: categories -> items.
#[derive(Debug, Deserialize)]
pub struct RawMenu {
    #[serde(default, alias = "menu_categories")]
    pub categories: Vec<RawMenuCategory>,
}

#[derive(Debug, Deserialize)]
pub struct RawMenuCategory {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "menu_items")]
    pub items: Vec<RawMenuItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawMenuItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default, alias = "available")]
    pub is_available: Option<bool>,
}

impl RawMenu {
    pub fn into_menu(self, restaurant_id: &str) -> Menu {
        let categories = self
            .categories
            .into_iter()
            .map(|c| MenuCategory {
                name: c.name,
                items: c
                    .items
                    .into_iter()
                    .filter(|i| !i.name.is_empty())
                    .map(|i| MenuItem {
                        id: i.id,
                        name: i.name,
                        description: i.description.unwrap_or_default(),
                        price: i.price.filter(|p| p.is_finite() && *p >= 0.0).unwrap_or(0.0),
                        allergens: i.allergens,
                        available: i.is_available.unwrap_or(true),
                    })
                    .collect(),
            })
            .collect();

        Menu {
            restaurant_id: restaurant_id.to_string(),
            categories,
            source: Source::Menu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_page_defaults() {
        let raw: RawReviewPage = serde_json::from_value(json!({
            "reviews": [
                { "id": "r1", "rating": 5, "text": "Great pasta", "user": { "name": "Sam" }, "time_created": "2024-01-02 10:00:00" },
                { "id": "r2", "text": "Fine" }
            ],
            "possible_languages": ["en"]
        }))
        .unwrap();

        let page = raw.into_page();
        assert_eq!(page.total, 2);
        assert_eq!(page.source, Source::Business);
        assert_eq!(page.reviews[0].user_name, "Sam");
        assert_eq!(page.reviews[1].rating, 0.0);
        assert_eq!(page.reviews[1].user_name, "");
    }

    #[test]
    fn test_menu_aliases_and_defaults() {
        let raw: RawMenu = serde_json::from_value(json!({
            "menu_categories": [{
                "name": "Pasta",
                "menu_items": [
                    { "id": "i1", "name": "Carbonara", "price": 18.5, "allergens": ["egg", "dairy"], "is_available": false },
                    { "id": "i2", "name": "Aglio e Olio" },
                    { "id": "i3", "name": "" }
                ]
            }]
        }))
        .unwrap();

        let menu = raw.into_menu("r1");
        assert_eq!(menu.item_count(), 2);
        assert_eq!(menu.source, Source::Menu);
        let items = &menu.categories[0].items;
        assert!(!items[0].available);
        assert_eq!(items[1].price, 0.0);
        assert!(items[1].available);
    }
}
