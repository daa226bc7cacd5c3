/// Rate selection strategies.
///
/// `select` filters a rate list by the criteria's hard limits, ranks the
/// survivors with the chosen strategy and explains the pick. Every ranking
/// ends with `(provider_id, courier_code)`, so the same input always yields
/// the same winner in the same alternative order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

use crate::error::{Result, ShippingError};
use crate::models::provider::ProviderId;
use crate::models::rate::ShippingRate;
use crate::models::selection::{
    FilterReason, FilteredRate, SelectionCriteria, SelectionMetadata, SelectionResult,
    SelectionStrategy,
};
use crate::registry::ProviderPriorities;

/// One ranking key, in the order a strategy consults them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RankKey {
    Score,
    Rate,
    Days,
    Priority,
    Identity,
}

impl RankKey {
    fn label(self) -> &'static str {
        match self {
            RankKey::Score => "weighted score",
            RankKey::Rate => "rate",
            RankKey::Days => "estimated days",
            RankKey::Priority => "provider priority",
            RankKey::Identity => "provider and courier id",
        }
    }
}

const CHEAPEST_KEYS: &[RankKey] = &[RankKey::Rate, RankKey::Days, RankKey::Priority, RankKey::Identity];
const FASTEST_KEYS: &[RankKey] = &[RankKey::Days, RankKey::Rate, RankKey::Priority, RankKey::Identity];
const BALANCED_KEYS: &[RankKey] = &[
    RankKey::Score,
    RankKey::Rate,
    RankKey::Days,
    RankKey::Priority,
    RankKey::Identity,
];
const PRIORITY_KEYS: &[RankKey] = &[RankKey::Priority, RankKey::Rate, RankKey::Days, RankKey::Identity];

/// A candidate with everything its ranking needs precomputed.
#[derive(Debug, Clone)]
struct Candidate {
    rate: ShippingRate,
    priority: u32,
    /// Balanced score; zero for other strategies.
    score: f64,
}

impl Candidate {
    fn compare(&self, other: &Candidate, key: RankKey) -> Ordering {
        match key {
            // Scores are rounded so float noise never beats a real tie-break.
            RankKey::Score => round_score(self.score).total_cmp(&round_score(other.score)),
            RankKey::Rate => self.rate.rate.total_cmp(&other.rate.rate),
            RankKey::Days => self.rate.estimated_days.cmp(&other.rate.estimated_days),
            RankKey::Priority => self.priority.cmp(&other.priority),
            RankKey::Identity => (&self.rate.provider_id, &self.rate.courier_code)
                .cmp(&(&other.rate.provider_id, &other.rate.courier_code)),
        }
    }

    fn compare_by(&self, other: &Candidate, keys: &[RankKey]) -> Ordering {
        keys.iter()
            .map(|key| self.compare(other, *key))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

fn round_score(score: f64) -> f64 {
    (score * 1e9).round() / 1e9
}

/// First key that separates `winner` from `runner_up`.
fn deciding_key(winner: &Candidate, runner_up: &Candidate, keys: &[RankKey]) -> Option<RankKey> {
    keys.iter()
        .copied()
        .find(|key| winner.compare(runner_up, *key).is_ne())
}

/// Splits rates into candidates and filtered-out rates with reasons.
fn apply_filters(rates: &[ShippingRate], criteria: &SelectionCriteria) -> (Vec<ShippingRate>, Vec<FilteredRate>) {
    let mut kept = Vec::new();
    let mut filtered = Vec::new();
    for rate in rates {
        let reason = if !rate.available {
            Some(FilterReason::Unavailable)
        } else if let Some(max_cost) = criteria.max_cost.filter(|max| rate.rate > *max) {
            Some(FilterReason::ExceedsMaxCost { max_cost })
        } else if let Some(max_days) = criteria.max_days.filter(|max| rate.estimated_days > *max) {
            Some(FilterReason::ExceedsMaxDays { max_days })
        } else {
            None
        };
        match reason {
            Some(reason) => filtered.push(FilteredRate {
                rate: rate.clone(),
                reason,
            }),
            None => kept.push(rate.clone()),
        }
    }
    (kept, filtered)
}

fn validate(criteria: &SelectionCriteria) -> Result<Option<(f64, f64)>> {
    if let Some(max_cost) = criteria.max_cost {
        if !max_cost.is_finite() || max_cost < 0.0 {
            return Err(ShippingError::InvalidCriteria(format!(
                "max_cost must be a non-negative amount, got {max_cost}"
            )));
        }
    }
    match &criteria.strategy {
        SelectionStrategy::Balanced(weights) => weights.resolve().map(Some),
        _ => Ok(None),
    }
}

fn build_candidates(rates: Vec<ShippingRate>, priorities: &ProviderPriorities, weights: Option<(f64, f64)>) -> Vec<Candidate> {
    let span = |values: &[f64]| {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    };
    let costs: Vec<f64> = rates.iter().map(|r| r.rate).collect();
    let days: Vec<f64> = rates.iter().map(|r| f64::from(r.estimated_days)).collect();
    let (cost_min, cost_max) = span(&costs);
    let (days_min, days_max) = span(&days);
    let normalize = |value: f64, min: f64, max: f64| {
        if max > min {
            (value - min) / (max - min)
        } else {
            0.0
        }
    };

    rates
        .into_iter()
        .map(|rate| {
            let score = match weights {
                Some((cost_weight, speed_weight)) => {
                    cost_weight * normalize(rate.rate, cost_min, cost_max)
                        + speed_weight * normalize(f64::from(rate.estimated_days), days_min, days_max)
                }
                None => 0.0,
            };
            Candidate {
                priority: priorities.get(&rate.provider_id),
                rate,
                score,
            }
        })
        .collect()
}

fn describe(strategy: &SelectionStrategy, winner: &Candidate, weights: Option<(f64, f64)>) -> String {
    let rate = &winner.rate;
    match strategy {
        SelectionStrategy::Cheapest => format!(
            "cheapest: lowest rate {:.2} from {} ({})",
            rate.rate, rate.provider_id, rate.courier_name
        ),
        SelectionStrategy::Fastest => format!(
            "fastest: {} day delivery from {} ({})",
            rate.estimated_days, rate.provider_id, rate.courier_name
        ),
        SelectionStrategy::Balanced(_) => {
            let (cost_weight, speed_weight) = weights.unwrap_or((0.5, 0.5));
            format!(
                "balanced: best score {:.3} (cost weight {cost_weight}, speed weight {speed_weight}) from {} ({})",
                winner.score, rate.provider_id, rate.courier_name
            )
        }
        SelectionStrategy::Priority => format!(
            "priority: highest priority provider {} (priority {})",
            rate.provider_id, winner.priority
        ),
        SelectionStrategy::Specific { provider_id } => format!(
            "specific: cheapest rate {:.2} from requested provider {provider_id} ({})",
            rate.rate, rate.courier_name
        ),
        SelectionStrategy::Custom(_) => format!(
            "custom: chosen by caller-supplied selector ({} / {})",
            rate.provider_id, rate.courier_name
        ),
    }
}

fn ranking_keys(strategy: &SelectionStrategy) -> &'static [RankKey] {
    match strategy {
        SelectionStrategy::Fastest => FASTEST_KEYS,
        SelectionStrategy::Balanced(_) => BALANCED_KEYS,
        SelectionStrategy::Priority => PRIORITY_KEYS,
        SelectionStrategy::Cheapest | SelectionStrategy::Specific { .. } | SelectionStrategy::Custom(_) => {
            CHEAPEST_KEYS
        }
    }
}

/// Selects the best rate under `criteria`.
///
/// Returns `Ok(None)` when no rate survives filtering (or, for `specific`,
/// when the requested provider offered nothing). `Err` only signals
/// malformed criteria.
pub fn select(
    rates: &[ShippingRate],
    criteria: &SelectionCriteria,
    priorities: &ProviderPriorities,
) -> Result<Option<SelectionResult>> {
    let started = Instant::now();
    let weights = validate(criteria)?;
    let (mut kept, filtered_rates) = apply_filters(rates, criteria);

    if let SelectionStrategy::Specific { provider_id } = &criteria.strategy {
        kept.retain(|r| &r.provider_id == provider_id);
    }

    let keys = ranking_keys(&criteria.strategy);
    let preferred: HashSet<&ProviderId> = criteria.preferred_providers.iter().collect();
    let (preferred_rates, other_rates): (Vec<ShippingRate>, Vec<ShippingRate>) = kept
        .into_iter()
        .partition(|r| preferred.contains(&r.provider_id));
    let among_preferred = !preferred_rates.is_empty();
    let (pool_rates, rest_rates) = if among_preferred {
        (preferred_rates, other_rates)
    } else {
        (other_rates, Vec::new())
    };
    // Balanced scores are normalized within the partition being ranked.
    let mut pool = build_candidates(pool_rates, priorities, weights);
    let mut rest = build_candidates(rest_rates, priorities, weights);
    pool.sort_by(|a, b| a.compare_by(b, keys));
    rest.sort_by(|a, b| a.compare_by(b, keys));

    if pool.is_empty() {
        tracing::debug!(
            strategy = criteria.strategy.name(),
            evaluated = rates.len(),
            filtered = filtered_rates.len(),
            "no rate satisfies the selection criteria"
        );
        return Ok(None);
    }

    let winner_index = match &criteria.strategy {
        SelectionStrategy::Custom(selector) => {
            let offered: Vec<ShippingRate> = pool.iter().map(|c| c.rate.clone()).collect();
            match selector.call(&offered) {
                None => return Ok(None),
                Some(chosen) => pool.iter().position(|c| c.rate == chosen).ok_or_else(|| {
                    ShippingError::InvalidCriteria(
                        "custom selector returned a rate that was not offered to it".to_string(),
                    )
                })?,
            }
        }
        _ => 0,
    };
    let winner = pool.remove(winner_index);

    let mut reason = describe(&criteria.strategy, &winner, weights);
    if among_preferred {
        reason.push_str(" among preferred providers");
    }
    if !matches!(criteria.strategy, SelectionStrategy::Custom(_)) {
        if let Some(key) = pool.first().and_then(|runner_up| deciding_key(&winner, runner_up, keys)) {
            if key != keys[0] {
                reason.push_str(&format!(
                    "; tie on {} broken by {}",
                    keys[0].label(),
                    key.label()
                ));
            }
        }
    }

    let metadata = SelectionMetadata {
        total_rates_evaluated: rates.len(),
        rates_filtered: filtered_rates.len(),
        selection_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    };
    Ok(Some(SelectionResult {
        selected_rate: winner.rate,
        reason,
        alternative_rates: pool.into_iter().chain(rest).map(|c| c.rate).collect(),
        filtered_rates,
        metadata,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rate::ShippingMode;
    use crate::models::selection::{BalancedWeights, CustomSelector};

    fn rate(provider: &str, courier: &str, price: f64, days: u32) -> ShippingRate {
        ShippingRate {
            provider_id: ProviderId::from(provider),
            provider_name: provider.to_uppercase(),
            courier_name: courier.to_string(),
            courier_code: courier.to_string(),
            rate: price,
            estimated_days: days,
            mode: ShippingMode::Surface,
            available: true,
            features: None,
            performance: None,
            constraints: None,
            charges: None,
        }
    }

    fn priorities() -> ProviderPriorities {
        [("p1", 1), ("p2", 2), ("p3", 3)]
            .into_iter()
            .map(|(id, p)| (ProviderId::from(id), p))
            .collect()
    }

    fn three_rates() -> Vec<ShippingRate> {
        vec![
            rate("p1", "c1", 100.0, 5),
            rate("p2", "c2", 80.0, 7),
            rate("p3", "c3", 80.0, 3),
        ]
    }

    fn pick(rates: &[ShippingRate], criteria: SelectionCriteria) -> SelectionResult {
        select(rates, &criteria, &priorities()).unwrap().unwrap()
    }

    #[test]
    fn test_cheapest_breaks_rate_tie_by_days() {
        let result = pick(&three_rates(), SelectionCriteria::cheapest());
        assert_eq!(result.selected_rate.provider_id.as_str(), "p3");
        assert!(result.reason.starts_with("cheapest"));
        assert!(result.reason.contains("broken by estimated days"));
        let alternatives: Vec<_> = result.alternative_rates.iter().map(|r| r.provider_id.as_str()).collect();
        assert_eq!(alternatives, vec!["p2", "p1"]);
    }

    #[test]
    fn test_fastest_picks_fewest_days() {
        let result = pick(&three_rates(), SelectionCriteria::fastest());
        assert_eq!(result.selected_rate.provider_id.as_str(), "p3");
        assert!(!result.reason.contains("tie"));
    }

    #[test]
    fn test_specific_only_considers_that_provider() {
        let result = pick(&three_rates(), SelectionCriteria::specific("p1"));
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
        assert!(result.alternative_rates.is_empty());
        assert!(select(&three_rates(), &SelectionCriteria::specific("p9"), &priorities())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_priority_ignores_price() {
        let result = pick(&three_rates(), SelectionCriteria::priority());
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
    }

    #[test]
    fn test_equal_offers_fall_back_to_priority_then_identity() {
        let rates = vec![
            rate("p2", "b", 50.0, 2),
            rate("p2", "a", 50.0, 2),
            rate("p1", "z", 50.0, 2),
        ];
        let result = pick(&rates, SelectionCriteria::cheapest());
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
        assert!(result.reason.contains("broken by provider priority"));
        assert_eq!(result.alternative_rates[0].courier_code, "a");
    }

    #[test]
    fn test_selection_is_deterministic_across_input_order() {
        let mut rates = three_rates();
        rates.push(rate("p1", "c4", 80.0, 3));
        let forward = pick(&rates, SelectionCriteria::balanced(BalancedWeights::default()));
        rates.reverse();
        let backward = pick(&rates, SelectionCriteria::balanced(BalancedWeights::default()));
        assert_eq!(forward.selected_rate, backward.selected_rate);
        assert_eq!(forward.alternative_rates, backward.alternative_rates);
        assert_eq!(forward.reason, backward.reason);
    }

    #[test]
    fn test_balanced_weights_shift_the_winner() {
        let rates = vec![rate("p1", "slow", 50.0, 8), rate("p2", "quick", 90.0, 2)];
        let cost_heavy = pick(&rates, SelectionCriteria::balanced(BalancedWeights::new(0.9, 0.1)));
        assert_eq!(cost_heavy.selected_rate.courier_code, "slow");
        let speed_heavy = pick(&rates, SelectionCriteria::balanced(BalancedWeights::new(0.1, 0.9)));
        assert_eq!(speed_heavy.selected_rate.courier_code, "quick");
    }

    #[test]
    fn test_balanced_with_identical_values_normalizes_to_zero() {
        let rates = vec![rate("p2", "x", 60.0, 4), rate("p1", "y", 60.0, 4)];
        let result = pick(&rates, SelectionCriteria::balanced(BalancedWeights::default()));
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
        assert!(result.reason.contains("best score 0.000"));
    }

    #[test]
    fn test_invalid_weights_are_rejected_even_without_rates() {
        let criteria = SelectionCriteria::balanced(BalancedWeights::new(0.7, 0.7));
        assert!(matches!(
            select(&[], &criteria, &priorities()),
            Err(ShippingError::InvalidCriteria(_))
        ));
    }

    #[test]
    fn test_filters_record_reasons() {
        let mut rates = three_rates();
        rates[0].available = false;
        let criteria = SelectionCriteria::cheapest().with_max_cost(90.0).with_max_days(5);
        let result = pick(&rates, criteria);
        assert_eq!(result.selected_rate.provider_id.as_str(), "p3");
        assert_eq!(result.filtered_rates.len(), 2);
        assert_eq!(result.filtered_rates[0].reason, FilterReason::Unavailable);
        assert_eq!(
            result.filtered_rates[1].reason,
            FilterReason::ExceedsMaxDays { max_days: 5 }
        );
        assert_eq!(result.metadata.total_rates_evaluated, 3);
        assert_eq!(result.metadata.rates_filtered, 2);
    }

    #[test]
    fn test_everything_filtered_yields_none() {
        let criteria = SelectionCriteria::cheapest().with_max_cost(10.0);
        assert!(select(&three_rates(), &criteria, &priorities()).unwrap().is_none());
    }

    #[test]
    fn test_preferred_providers_rank_first() {
        let criteria = SelectionCriteria::cheapest().with_preferred(vec![ProviderId::from("p1")]);
        let result = pick(&three_rates(), criteria);
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
        assert!(result.reason.contains("among preferred providers"));
        let alternatives: Vec<_> = result.alternative_rates.iter().map(|r| r.provider_id.as_str()).collect();
        assert_eq!(alternatives, vec!["p3", "p2"]);
    }

    #[test]
    fn test_balanced_scores_are_normalized_within_preferred_providers() {
        let rates = vec![
            rate("p1", "steady", 100.0, 5),
            rate("p1", "express", 120.0, 2),
            rate("p2", "budget", 10.0, 1),
        ];
        let criteria = SelectionCriteria::balanced(BalancedWeights::new(0.6, 0.4))
            .with_preferred(vec![ProviderId::from("p1")]);
        let result = pick(&rates, criteria);
        assert_eq!(result.selected_rate.courier_code, "steady");
        assert!(result.reason.contains("best score 0.400"));
        assert!(result.reason.contains("among preferred providers"));
        let alternatives: Vec<_> = result.alternative_rates.iter().map(|r| r.courier_code.as_str()).collect();
        assert_eq!(alternatives, vec!["express", "budget"]);
    }

    #[test]
    fn test_preferred_without_rates_falls_back_to_all() {
        let criteria = SelectionCriteria::cheapest().with_preferred(vec![ProviderId::from("p9")]);
        let result = pick(&three_rates(), criteria);
        assert_eq!(result.selected_rate.provider_id.as_str(), "p3");
        assert!(!result.reason.contains("preferred"));
    }

    #[test]
    fn test_custom_selector_result_is_used_verbatim() {
        let most_expensive = CustomSelector::new(|rates: &[ShippingRate]| {
            rates.iter().max_by(|a, b| a.rate.total_cmp(&b.rate)).cloned()
        });
        let result = pick(&three_rates(), SelectionCriteria::custom(most_expensive));
        assert_eq!(result.selected_rate.provider_id.as_str(), "p1");
        assert!(result.reason.starts_with("custom"));
        assert_eq!(result.alternative_rates.len(), 2);
    }

    #[test]
    fn test_custom_selector_must_return_an_offered_rate() {
        let invented = CustomSelector::new(|_: &[ShippingRate]| Some(rate("p9", "x", 1.0, 1)));
        assert!(matches!(
            select(&three_rates(), &SelectionCriteria::custom(invented), &priorities()),
            Err(ShippingError::InvalidCriteria(_))
        ));
    }
}
