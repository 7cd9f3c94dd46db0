// Static sample data served when a provider is unconfigured or unavailable.

use crate::{
    config::PHOTO_PLACEHOLDER,
    models::{Menu, MenuCategory, MenuItem, Review, ReviewPage},
    normalizer::{Address, Coordinates, Place, PriceTier, Source},
};

struct Entry {
    id: &'static str,
    name: &'static str,
    rating: f64,
    review_count: u32,
    categories: &'static [&'static str],
    address: (&'static str, &'static str, &'static str, &'static str),
    phone: &'static str,
    price_tier: PriceTier,
    coordinates: (f64, f64),
    is_open_now: bool,
}

const CATALOG: &[Entry] = &[
    Entry {
        id: "fallback-bella-notte",
        name: "Bella Notte Trattoria",
        rating: 4.6,
        review_count: 1284,
        categories: &["Restaurant", "Italian"],
        address: ("418 Columbus Ave", "San Francisco", "CA", "94133"),
        phone: "(415) 555-0142",
        price_tier: PriceTier::Moderate,
        coordinates: (37.7990, -122.4089),
        is_open_now: true,
    },
    Entry {
        id: "fallback-nonnas-kitchen",
        name: "Nonna's Kitchen",
        rating: 4.4,
        review_count: 532,
        categories: &["Italian", "Pizza"],
        address: ("77 Mission St", "San Francisco", "CA", "94105"),
        phone: "(415) 555-0178",
        price_tier: PriceTier::Inexpensive,
        coordinates: (37.7929, -122.3937),
        is_open_now: true,
    },
    Entry {
        id: "fallback-sakura-sushi",
        name: "Sakura Sushi Bar",
        rating: 4.7,
        review_count: 902,
        categories: &["Japanese", "Sushi"],
        address: ("1560 Post St", "San Francisco", "CA", "94109"),
        phone: "(415) 555-0119",
        price_tier: PriceTier::Expensive,
        coordinates: (37.7856, -122.4290),
        is_open_now: false,
    },
    Entry {
        id: "fallback-taqueria-sol",
        name: "Taqueria del Sol",
        rating: 4.5,
        review_count: 2210,
        categories: &["Mexican", "Takeout"],
        address: ("2889 Mission St", "San Francisco", "CA", "94110"),
        phone: "(415) 555-0186",
        price_tier: PriceTier::Inexpensive,
        coordinates: (37.7509, -122.4182),
        is_open_now: true,
    },
    Entry {
        id: "fallback-golden-dragon",
        name: "Golden Dragon",
        rating: 4.1,
        review_count: 655,
        categories: &["Chinese", "Restaurant"],
        address: ("816 Washington St", "San Francisco", "CA", "94108"),
        phone: "(415) 555-0133",
        price_tier: PriceTier::Inexpensive,
        coordinates: (37.7950, -122.4068),
        is_open_now: true,
    },
    Entry {
        id: "fallback-spice-route",
        name: "Spice Route",
        rating: 4.3,
        review_count: 418,
        categories: &["Indian", "Vegetarian"],
        address: ("1247 Polk St", "San Francisco", "CA", "94109"),
        phone: "(415) 555-0167",
        price_tier: PriceTier::Moderate,
        coordinates: (37.7885, -122.4200),
        is_open_now: false,
    },
    Entry {
        id: "fallback-harbor-grill",
        name: "Harbor Grill",
        rating: 4.2,
        review_count: 743,
        categories: &["Seafood", "Steakhouse"],
        address: ("1 Embarcadero Ctr", "San Francisco", "CA", "94111"),
        phone: "(415) 555-0105",
        price_tier: PriceTier::VeryExpensive,
        coordinates: (37.7946, -122.3999),
        is_open_now: true,
    },
    Entry {
        id: "fallback-morning-cup",
        name: "Morning Cup Cafe",
        rating: 4.0,
        review_count: 201,
        categories: &["Cafe", "Coffee", "Breakfast"],
        address: ("300 Hayes St", "San Francisco", "CA", "94102"),
        phone: "(415) 555-0150",
        price_tier: PriceTier::Inexpensive,
        coordinates: (37.7770, -122.4220),
        is_open_now: true,
    },
];

impl Entry {
    fn to_place(&self) -> Place {
        let (address_line, city, state, zip_code) = self.address;
        Place {
            id: self.id.to_string(),
            name: self.name.to_string(),
            rating: self.rating,
            review_count: self.review_count,
            categories: self.categories.iter().map(|c| c.to_string()).collect(),
            location: Address {
                address_line: address_line.to_string(),
                city: city.to_string(),
                state: state.to_string(),
                zip_code: zip_code.to_string(),
            },
            phone: self.phone.to_string(),
            image: PHOTO_PLACEHOLDER.to_string(),
            price_tier: self.price_tier,
            coordinates: Some(Coordinates {
                latitude: self.coordinates.0,
                longitude: self.coordinates.1,
            }),
            is_open_now: self.is_open_now,
            source: Source::Fallback,
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .categories
                .iter()
                .any(|c| c.to_lowercase().contains(needle))
    }
}

pub fn catalog() -> Vec<Place> {
    CATALOG.iter().map(Entry::to_place).collect()
}

// Case-insensitive substring match on name and categories; a blank term keeps everything.
pub fn search_catalog(term: &str) -> Vec<Place> {
    let needle = term.trim().to_lowercase();
    CATALOG
        .iter()
        .filter(|e| needle.is_empty() || e.matches(&needle))
        .map(Entry::to_place)
        .collect()
}

pub fn find_place(id: &str) -> Option<Place> {
    CATALOG.iter().find(|e| e.id == id).map(Entry::to_place)
}

pub fn sample_reviews(business_id: &str) -> ReviewPage {
    let samples = [
        (5.0, "Everything we ordered was excellent, the staff were lovely too.", "Jordan P."),
        (4.0, "Solid food and quick service. A little loud on weekends.", "Casey L."),
        (3.0, "Good portions but the wait for a table was long.", "Riley M."),
    ];

    let reviews: Vec<Review> = samples
        .iter()
        .enumerate()
        .map(|(i, (rating, text, user))| Review {
            id: format!("{business_id}-review-{}", i + 1),
            rating: *rating,
            text: text.to_string(),
            user_name: user.to_string(),
            time_created: format!("2024-0{}-1{} 18:30:00", i + 3, i + 2),
        })
        .collect();

    ReviewPage {
        total: reviews.len() as u32,
        reviews,
        possible_languages: vec!["en".to_string()],
        source: Source::Fallback,
    }
}

fn item(id: &str, name: &str, description: &str, price: f64, allergens: &[&str]) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price,
        allergens: allergens.iter().map(|a| a.to_string()).collect(),
        available: true,
    }
}

pub fn sample_menu(restaurant_id: &str) -> Menu {
    Menu {
        restaurant_id: restaurant_id.to_string(),
        categories: vec![
            MenuCategory {
                name: "Starters".to_string(),
                items: vec![
                    item("s1", "Garden Salad", "Mixed greens, cherry tomatoes, house vinaigrette", 9.5, &[]),
                    item("s2", "Garlic Bread", "Toasted sourdough, herb butter", 6.0, &["gluten", "dairy"]),
                ],
            },
            MenuCategory {
                name: "Mains".to_string(),
                items: vec![
                    item("m1", "Grilled Chicken Plate", "Seasonal vegetables, rice", 18.0, &[]),
                    item("m2", "Vegetable Curry", "Coconut curry, jasmine rice", 16.5, &["tree nuts"]),
                    item("m3", "Fish Tacos", "Three tacos, slaw, lime crema", 15.0, &["fish", "dairy"]),
                ],
            },
            MenuCategory {
                name: "Desserts".to_string(),
                items: vec![item("d1", "Chocolate Cake", "Dark chocolate ganache", 8.0, &["gluten", "dairy", "egg"])],
            },
        ],
        source: Source::Fallback,
    }
}
