//! CLI tool to generate test data, the strategy report, and a fallback demo.
//!
//! Produces:
//! - `output/test_rate_requests.json`: 120 seeded rate requests
//! - `output/strategy_report.json`: strategy comparison over those requests
//! - `output/fallback_demo.json`: a booking where the first carrier fails

use std::sync::Arc;

use shipping_orchestrator::cache::InMemoryRateStore;
use shipping_orchestrator::config::EngineConfig;
use shipping_orchestrator::data::get_test_dataset;
use shipping_orchestrator::events::TracingEventSink;
use shipping_orchestrator::models::selection::SelectionCriteria;
use shipping_orchestrator::models::shipment::ShipmentOrder;
use shipping_orchestrator::registry::{ProviderRegistry, ProviderSettings};
use shipping_orchestrator::report::{default_strategies, generate_report};
use shipping_orchestrator::simulator::config::get_all_profiles;
use shipping_orchestrator::simulator::{FailureMode, SimulatedCarrier};
use shipping_orchestrator::ShippingEngine;

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    // Generate test rate requests
    let requests = get_test_dataset();
    let requests_json = serde_json::to_string_pretty(&requests).expect("Failed to serialize rate requests");
    std::fs::create_dir_all("output").expect("Failed to create output directory");
    std::fs::write("output/test_rate_requests.json", &requests_json).expect("Failed to write rate requests");
    println!("Wrote output/test_rate_requests.json ({} requests)", requests.len());

    // Generate strategy report against the default simulated carriers
    let engine = ShippingEngine::from_config(EngineConfig::default())
        .await
        .expect("Failed to build engine");
    let report = generate_report(&requests, &engine, &default_strategies()).await;
    let report_json = serde_json::to_string_pretty(&report).expect("Failed to serialize report");
    std::fs::write("output/strategy_report.json", &report_json).expect("Failed to write report");

    println!("Wrote output/strategy_report.json");
    println!();
    println!("=== STRATEGY REPORT SUMMARY ===");
    println!("Total Requests:       {}", report.total_requests);
    println!("Aggregation Failures: {}", report.aggregation_failures);
    for result in &report.strategies {
        println!();
        println!("--- {} ---", result.strategy);
        println!("  Selected:        {}", result.selected);
        println!("  Not Serviceable: {}", result.not_serviceable);
        println!("  Avg Cost:        ₹{:.2}", result.avg_cost);
        println!("  Avg Days:        {:.2}", result.avg_days);
        for (provider, wins) in &result.wins {
            println!("  Wins {:<11} {}", format!("{provider}:"), wins);
        }
    }
    println!();
    println!("--- By Provider ---");
    for (provider, metrics) in &report.by_provider {
        println!(
            "  {}: quoted {}, failed {}, avg cheapest ₹{:.2}",
            provider, metrics.quoted, metrics.failed, metrics.avg_cheapest_rate
        );
    }

    // Fallback demo: the cheapest carrier rejects bookings
    let registry = Arc::new(ProviderRegistry::new());
    for (i, profile) in get_all_profiles().into_iter().enumerate() {
        let id = profile.id;
        let carrier = SimulatedCarrier::new(id, profile);
        let carrier = if id == "swiftship" {
            carrier.with_failure(FailureMode::Shipments("pickup slot unavailable".to_string()))
        } else {
            carrier
        };
        registry.register(Arc::new(carrier), ProviderSettings::new(i as u32 + 1));
    }
    let demo_engine = ShippingEngine::new(
        EngineConfig::default(),
        registry,
        Arc::new(InMemoryRateStore::new()),
        Arc::new(TracingEventSink),
    );
    let order: ShipmentOrder = serde_json::from_value(serde_json::json!({
        "order_id": "DEMO-1001",
        "order_date": "2024-06-01",
        "pickup": {"name": "Bengaluru Warehouse", "phone": "8000000000", "line1": "KIADB Industrial Area",
                    "city": "Bengaluru", "state": "Karnataka", "pincode": "560001"},
        "delivery": {"name": "Anika Rao", "phone": "9800000000", "line1": "14 Marine Drive",
                      "city": "Mumbai", "state": "Maharashtra", "pincode": "400020"},
        "package": {"weight_kg": 1.2, "length_cm": 25, "breadth_cm": 20, "height_cm": 10},
        "items": [{"name": "Running Shoes", "sku": "RS-42", "units": 1, "unit_price": 2499}],
        "payment": {"method": "cod", "amount": 2499},
        "declared_value": 2499
    }))
    .expect("Failed to build demo order");
    let outcome = demo_engine
        .create_shipment_with_attempts(&order, Some(&SelectionCriteria::cheapest()))
        .await
        .expect("Fallback demo failed");
    let outcome_json = serde_json::to_string_pretty(&outcome).expect("Failed to serialize outcome");
    std::fs::write("output/fallback_demo.json", &outcome_json).expect("Failed to write fallback demo");

    println!();
    println!("Wrote output/fallback_demo.json");
    println!("--- Fallback Demo ---");
    for attempt in &outcome.attempts {
        println!(
            "  #{} {} {}",
            attempt.attempt_number,
            attempt.provider_id,
            match &attempt.error {
                Some(error) => format!("failed: {error}"),
                None => "booked".to_string(),
            }
        );
    }
    println!(
        "  Shipped via {} ({}), AWB {}",
        outcome.shipment.provider_id, outcome.shipment.courier_name, outcome.shipment.tracking_number
    );
}
