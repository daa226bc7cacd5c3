use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report comparing selection strategies over one set of rate requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    /// Total number of rate requests evaluated.
    pub total_requests: usize,
    /// Requests for which aggregation itself failed (no strategy could run).
    pub aggregation_failures: usize,
    /// One entry per strategy, in the order they were evaluated.
    pub strategies: Vec<StrategyResult>,
    /// Quote coverage per provider across the whole dataset.
    pub by_provider: BTreeMap<String, ProviderMetrics>,
}

/// Outcome of running one strategy over every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Strategy label, e.g. `cheapest` or `fastest (max 3 days)`.
    pub strategy: String,
    /// Requests for which a rate was selected.
    pub selected: usize,
    /// Requests with no rate passing the criteria.
    pub not_serviceable: usize,
    /// Average selected rate in INR.
    pub avg_cost: f64,
    /// Average estimated delivery days of the selected rate.
    pub avg_days: f64,
    /// Sum of selected rates in INR.
    pub total_cost: f64,
    /// Number of requests each provider won.
    pub wins: BTreeMap<String, usize>,
}

/// How often a provider quoted across the dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMetrics {
    /// Requests this provider returned at least one available rate for.
    pub quoted: usize,
    /// Requests where this provider failed outright.
    pub failed: usize,
    /// Average of this provider's cheapest available rate per quoted request.
    pub avg_cheapest_rate: f64,
}

/// API request body for the /api/report endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Number of rate requests to evaluate (default: 120).
    pub request_count: Option<usize>,
    /// Delivery-days ceiling applied to every strategy.
    pub max_days: Option<u32>,
    /// Cost ceiling applied to every strategy.
    pub max_cost: Option<f64>,
}
