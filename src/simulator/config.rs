//! Carrier profiles for the simulated providers.
//!
//! Three simulated carrier-aggregator accounts with two or three couriers
//! each. Pricing follows the slab model Indian aggregators use: a base
//! charge plus a per-0.5 kg increment, scaled by zone, with an air premium
//! and a COD surcharge.

use crate::models::rate::ShippingMode;

/// One courier offered through a simulated provider.
#[derive(Debug, Clone)]
pub struct CourierProfile {
    pub code: &'static str,
    pub name: &'static str,
    pub mode: ShippingMode,
    /// Charge for the first 0.5 kg slab.
    pub base_charge: f64,
    /// Charge per additional 0.5 kg slab.
    pub per_slab: f64,
    /// Days for a local delivery; each zone step adds one.
    pub base_days: u32,
    pub cod: bool,
    pub rating: f64,
}

/// Pricing and behaviour of one simulated provider.
#[derive(Debug, Clone)]
pub struct CarrierProfile {
    pub id: &'static str,
    pub name: &'static str,
    /// Prefix for generated AWB numbers.
    pub awb_prefix: &'static str,
    pub tracking_url_base: &'static str,
    /// Multiplier per zone: local, regional, national, remote.
    pub zone_multipliers: [f64; 4],
    /// COD surcharge: the larger of a flat minimum and a percentage.
    pub cod_min_charge: f64,
    pub cod_percentage: f64,
    /// Destination pincode prefixes this provider does not serve.
    pub unserviceable_prefixes: &'static [&'static str],
    pub couriers: Vec<CourierProfile>,
}

/// Returns the profile for a simulated provider id, if known.
pub fn get_profile(id: &str) -> Option<CarrierProfile> {
    get_all_profiles().into_iter().find(|p| p.id == id)
}

/// Returns all built-in simulated provider profiles.
///
/// - `swiftship`: cheapest surface network, slow to remote zones
/// - `bluecargo`: premium air-heavy network, fastest, most expensive
/// - `parcelpro`: balanced mid-market network, skips the north-east
pub fn get_all_profiles() -> Vec<CarrierProfile> {
    vec![
        CarrierProfile {
            id: "swiftship",
            name: "SwiftShip",
            awb_prefix: "SS",
            tracking_url_base: "https://track.swiftship.example/awb/",
            zone_multipliers: [1.0, 1.25, 1.6, 2.1],
            cod_min_charge: 35.0,
            cod_percentage: 1.75,
            unserviceable_prefixes: &[],
            couriers: vec![
                CourierProfile {
                    code: "ss_delhivery_surface",
                    name: "Delhivery Surface",
                    mode: ShippingMode::Surface,
                    base_charge: 38.0,
                    per_slab: 31.0,
                    base_days: 2,
                    cod: true,
                    rating: 4.1,
                },
                CourierProfile {
                    code: "ss_ecom_surface",
                    name: "Ecom Express Surface",
                    mode: ShippingMode::Surface,
                    base_charge: 36.0,
                    per_slab: 33.0,
                    base_days: 3,
                    cod: true,
                    rating: 3.8,
                },
            ],
        },
        CarrierProfile {
            id: "bluecargo",
            name: "BlueCargo",
            awb_prefix: "BC",
            tracking_url_base: "https://bluecargo.example/track?awb=",
            zone_multipliers: [1.0, 1.2, 1.45, 1.8],
            cod_min_charge: 45.0,
            cod_percentage: 2.0,
            unserviceable_prefixes: &[],
            couriers: vec![
                CourierProfile {
                    code: "bc_bluedart_air",
                    name: "Blue Dart Air",
                    mode: ShippingMode::Air,
                    base_charge: 72.0,
                    per_slab: 58.0,
                    base_days: 1,
                    cod: true,
                    rating: 4.6,
                },
                CourierProfile {
                    code: "bc_dtdc_surface",
                    name: "DTDC Surface",
                    mode: ShippingMode::Surface,
                    base_charge: 45.0,
                    per_slab: 34.0,
                    base_days: 2,
                    cod: false,
                    rating: 3.9,
                },
            ],
        },
        CarrierProfile {
            id: "parcelpro",
            name: "ParcelPro",
            awb_prefix: "PP",
            tracking_url_base: "https://parcelpro.example/t/",
            zone_multipliers: [1.0, 1.22, 1.5, 1.95],
            cod_min_charge: 30.0,
            cod_percentage: 1.5,
            unserviceable_prefixes: &["78", "79"],
            couriers: vec![
                CourierProfile {
                    code: "pp_xpressbees_surface",
                    name: "XpressBees Surface",
                    mode: ShippingMode::Surface,
                    base_charge: 40.0,
                    per_slab: 30.0,
                    base_days: 2,
                    cod: true,
                    rating: 4.0,
                },
                CourierProfile {
                    code: "pp_shadowfax_surface",
                    name: "Shadowfax Surface",
                    mode: ShippingMode::Surface,
                    base_charge: 34.0,
                    per_slab: 35.0,
                    base_days: 3,
                    cod: true,
                    rating: 3.6,
                },
                CourierProfile {
                    code: "pp_xpressbees_air",
                    name: "XpressBees Air",
                    mode: ShippingMode::Air,
                    base_charge: 65.0,
                    per_slab: 55.0,
                    base_days: 1,
                    cod: true,
                    rating: 4.2,
                },
            ],
        },
    ]
}
