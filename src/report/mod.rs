/// Strategy comparison report for the shipping engine.
///
/// Aggregates rates once per request, runs every strategy over the same
/// rates, and summarizes what each strategy would have paid and how fast
/// it would have delivered.

use std::collections::BTreeMap;

use crate::engine::ShippingEngine;
use crate::models::rate::RateRequest;
use crate::models::report::{ProviderMetrics, StrategyReport, StrategyResult};
use crate::models::selection::{BalancedWeights, SelectionCriteria};

/// Default strategies compared by the report, with their labels.
pub fn default_strategies() -> Vec<(String, SelectionCriteria)> {
    vec![
        ("cheapest".to_string(), SelectionCriteria::cheapest()),
        ("fastest".to_string(), SelectionCriteria::fastest()),
        (
            "balanced (70% cost / 30% speed)".to_string(),
            SelectionCriteria::balanced(BalancedWeights::new(0.7, 0.3)),
        ),
        ("priority".to_string(), SelectionCriteria::priority()),
        (
            "cheapest (max 3 days)".to_string(),
            SelectionCriteria::cheapest().with_max_days(3),
        ),
    ]
}

/// Applies report-wide ceilings on top of each strategy's own criteria.
pub fn with_ceilings(
    strategies: Vec<(String, SelectionCriteria)>,
    max_days: Option<u32>,
    max_cost: Option<f64>,
) -> Vec<(String, SelectionCriteria)> {
    strategies
        .into_iter()
        .map(|(label, mut criteria)| {
            if let Some(days) = max_days {
                criteria.max_days = Some(criteria.max_days.map_or(days, |own| own.min(days)));
            }
            if let Some(cost) = max_cost {
                criteria.max_cost = Some(criteria.max_cost.map_or(cost, |own| own.min(cost)));
            }
            (label, criteria)
        })
        .collect()
}

#[derive(Default)]
struct Tally {
    selected: usize,
    not_serviceable: usize,
    total_cost: f64,
    total_days: u64,
    wins: BTreeMap<String, usize>,
}

impl Tally {
    fn into_result(self, strategy: String) -> StrategyResult {
        let avg = |total: f64| {
            if self.selected == 0 {
                0.0
            } else {
                round2(total / self.selected as f64)
            }
        };
        StrategyResult {
            strategy,
            selected: self.selected,
            not_serviceable: self.not_serviceable,
            avg_cost: avg(self.total_cost),
            avg_days: avg(self.total_days as f64),
            total_cost: round2(self.total_cost),
            wins: self.wins,
        }
    }
}

#[derive(Default)]
struct Coverage {
    quoted: usize,
    failed: usize,
    cheapest_total: f64,
}

/// Generate a strategy comparison over `requests`.
///
/// A request whose aggregation fails counts as not serviceable for every
/// strategy. A strategy that rejects its own criteria does the same.
pub async fn generate_report(
    requests: &[RateRequest],
    engine: &ShippingEngine,
    strategies: &[(String, SelectionCriteria)],
) -> StrategyReport {
    let mut tallies: Vec<Tally> = strategies.iter().map(|_| Tally::default()).collect();
    let mut coverage: BTreeMap<String, Coverage> = BTreeMap::new();
    let mut aggregation_failures = 0;

    for request in requests {
        let aggregated = match engine.get_rates_from_all_providers(request).await {
            Ok(aggregated) => aggregated,
            Err(e) => {
                tracing::debug!(
                    from = %request.from_pincode,
                    to = %request.to_pincode,
                    error = %e,
                    "no rates for report request"
                );
                aggregation_failures += 1;
                for tally in &mut tallies {
                    tally.not_serviceable += 1;
                }
                continue;
            }
        };

        let mut cheapest: BTreeMap<String, f64> = BTreeMap::new();
        for rate in aggregated.rates.iter().filter(|r| r.available) {
            let entry = cheapest.entry(rate.provider_id.to_string()).or_insert(f64::INFINITY);
            *entry = entry.min(rate.rate);
        }
        for (provider, rate) in cheapest {
            let c = coverage.entry(provider).or_default();
            c.quoted += 1;
            c.cheapest_total += rate;
        }
        for failure in &aggregated.failures {
            coverage.entry(failure.provider_id.to_string()).or_default().failed += 1;
        }

        for ((_, criteria), tally) in strategies.iter().zip(tallies.iter_mut()) {
            match engine.select(&aggregated.rates, criteria) {
                Ok(Some(result)) => {
                    let rate = result.selected_rate;
                    tally.selected += 1;
                    tally.total_cost += rate.rate;
                    tally.total_days += u64::from(rate.estimated_days);
                    *tally.wins.entry(rate.provider_id.to_string()).or_insert(0) += 1;
                }
                Ok(None) => tally.not_serviceable += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "strategy rejected its criteria");
                    tally.not_serviceable += 1;
                }
            }
        }
    }

    let by_provider = coverage
        .into_iter()
        .map(|(provider, c)| {
            let avg_cheapest_rate = if c.quoted == 0 {
                0.0
            } else {
                round2(c.cheapest_total / c.quoted as f64)
            };
            (
                provider,
                ProviderMetrics {
                    quoted: c.quoted,
                    failed: c.failed,
                    avg_cheapest_rate,
                },
            )
        })
        .collect();

    StrategyReport {
        total_requests: requests.len(),
        aggregation_failures,
        strategies: strategies
            .iter()
            .zip(tallies)
            .map(|((label, _), tally)| tally.into_result(label.clone()))
            .collect(),
        by_provider,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
