// Delivery quotes. No routing provider is wired in, so the distance is
// derived from a stable hash of the (restaurant, address) pair.

use crate::{error::SearchError, models::DeliveryEstimate};

const BASE_DELIVERY_FEE: f64 = 1.99;
const FEE_PER_MILE: f64 = 0.5;
const SERVICE_FEE: f64 = 2.49;
const TAX_RATE: f64 = 0.0875;
const BASE_MINUTES: u32 = 15;
const MINUTES_PER_MILE: f64 = 4.0;

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// FNV-1a, stable across runs and platforms
fn stable_hash(parts: &[&str]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in part.trim().to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash ^= 0xff;
    }
    hash
}

pub fn estimate_delivery(restaurant_id: &str, address: &str) -> Result<DeliveryEstimate, SearchError> {
    if restaurant_id.trim().is_empty() {
        return Err(SearchError::InvalidParameter(
            "restaurant id must not be empty".to_string(),
        ));
    }
    if address.trim().is_empty() {
        return Err(SearchError::InvalidParameter(
            "delivery address must not be empty".to_string(),
        ));
    }

    // 0.5 to 8.4 miles
    let distance = 0.5 + (stable_hash(&[restaurant_id, address]) % 80) as f64 / 10.0;
    let delivery_fee = round_cents(BASE_DELIVERY_FEE + FEE_PER_MILE * distance);

    Ok(DeliveryEstimate {
        estimated_delivery_time: BASE_MINUTES + (distance * MINUTES_PER_MILE).round() as u32,
        estimated_distance: distance,
        delivery_fee,
        service_fee: SERVICE_FEE,
        taxes: round_cents((delivery_fee + SERVICE_FEE) * TAX_RATE),
    })
}
