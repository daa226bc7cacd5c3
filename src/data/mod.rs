//! Test data generation for the shipping engine.
//!
//! Generates realistic rate requests for a D2C merchant shipping from a
//! handful of Indian warehouses to metro, tier-2 and north-east pincodes.
//! Uses seeded RNG for reproducible datasets across runs.
//!
//! # Data Distribution
//! - 120 requests by default, origins rotating across 3 warehouses
//! - 12 destination pincodes, including two in the north-east
//! - Weight range: 0.2–8 kg, skewed towards small parcels
//! - ~30% cash on delivery, ~20% air

use crate::models::rate::{RateRequest, ShippingMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Warehouse pincodes: Delhi, Bengaluru, Mumbai.
pub const ORIGIN_PINCODES: [&str; 3] = ["110001", "560001", "400001"];

/// Destination pincodes. `781001` (Guwahati) and `793001` (Shillong) sit in
/// the north-east, which not every carrier serves.
pub const DESTINATION_PINCODES: [&str; 12] = [
    "110017", "122001", "400070", "411001", "560034", "600001", "500081", "700016",
    "302001", "226001", "781001", "793001",
];

/// Data seed for reproducible generation.
const DATA_SEED: u64 = 42;

/// Generate a batch of rate requests with realistic distribution.
pub fn generate_rate_requests(count: usize) -> Vec<RateRequest> {
    let mut rng = StdRng::seed_from_u64(DATA_SEED);
    let mut requests = Vec::with_capacity(count);

    for i in 0..count {
        let from = ORIGIN_PINCODES[i % ORIGIN_PINCODES.len()];
        let to = DESTINATION_PINCODES[rng.gen_range(0..DESTINATION_PINCODES.len())];

        let weight_kg = round_to_grams(generate_weight(&mut rng));
        let declared_value = round_to_rupee(rng.gen_range(199.0..4999.0));

        // 30% COD, collecting the full declared value
        let cod_amount = if rng.gen_bool(0.30) { Some(declared_value) } else { None };

        let mode = if rng.gen_bool(0.20) {
            ShippingMode::Air
        } else {
            ShippingMode::Surface
        };

        requests.push(RateRequest {
            from_pincode: from.to_string(),
            to_pincode: to.to_string(),
            weight_kg,
            mode,
            cod_amount,
            declared_value: Some(declared_value),
        });
    }

    requests
}

/// Get the standard dataset of 120 rate requests.
///
/// This is the canonical dataset used for strategy reports and demos.
/// Always returns the same data (seeded RNG).
pub fn get_test_dataset() -> Vec<RateRequest> {
    generate_rate_requests(120)
}

/// Generate a parcel weight.
///
/// - 55% small: 0.2–1 kg
/// - 30% medium: 1–3 kg
/// - 15% heavy: 3–8 kg
fn generate_weight(rng: &mut StdRng) -> f64 {
    let roll: f64 = rng.gen();
    if roll < 0.55 {
        rng.gen_range(0.2..1.0)
    } else if roll < 0.85 {
        rng.gen_range(1.0..3.0)
    } else {
        rng.gen_range(3.0..8.0)
    }
}

fn round_to_grams(kg: f64) -> f64 {
    (kg * 1000.0).round() / 1000.0
}

fn round_to_rupee(amount: f64) -> f64 {
    amount.round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_correct_count() {
        assert_eq!(generate_rate_requests(50).len(), 50);
        assert_eq!(get_test_dataset().len(), 120);
    }

    #[test]
    fn test_is_deterministic() {
        assert_eq!(generate_rate_requests(40), generate_rate_requests(40));
    }

    #[test]
    fn test_every_request_is_valid() {
        for request in get_test_dataset() {
            assert!(request.validate().is_ok(), "invalid request {:?}", request);
            assert!(request.weight_kg >= 0.2 && request.weight_kg <= 8.0);
        }
    }

    #[test]
    fn test_origins_rotate_evenly() {
        let data = get_test_dataset();
        for origin in ORIGIN_PINCODES {
            let n = data.iter().filter(|r| r.from_pincode == origin).count();
            assert_eq!(n, 40);
        }
    }

    #[test]
    fn test_mix_of_payment_and_mode() {
        let data = get_test_dataset();
        let cod = data.iter().filter(|r| r.is_cod()).count();
        let air = data.iter().filter(|r| r.mode == ShippingMode::Air).count();
        assert!(cod > 10 && cod < 70, "cod count {cod}");
        assert!(air > 5 && air < 50, "air count {air}");
    }

    #[test]
    fn test_north_east_destinations_appear() {
        let data = get_test_dataset();
        assert!(data.iter().any(|r| r.to_pincode.starts_with("78") || r.to_pincode.starts_with("79")));
    }
}
