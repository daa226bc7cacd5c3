/// Fallback planning for shipment creation.
///
/// A `FallbackPlan` is the ordered list of providers the orchestrator tries,
/// each at most once. The attempt loop moves through `FallbackState`:
/// - `Pending` before the first attempt
/// - `Trying(id)` while a provider call is outstanding
/// - `Succeeded(id)` once a provider books the shipment (final)
/// - `FailedTryNext(id)` after a failure with candidates left
/// - `ExhaustedAllFailed` when the plan runs out (final)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::provider::ProviderId;
use crate::models::rate::ShippingRate;
use crate::models::shipment::Shipment;

/// One provider to try, optionally pinned to a courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCandidate {
    pub provider_id: ProviderId,
    #[serde(default)]
    pub courier_code: Option<String>,
}

/// Ordered, duplicate-free list of providers to try.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackPlan {
    candidates: Vec<FallbackCandidate>,
}

impl FallbackPlan {
    fn push(&mut self, seen: &mut HashSet<ProviderId>, provider_id: ProviderId, courier_code: Option<String>) {
        if seen.insert(provider_id.clone()) {
            self.candidates.push(FallbackCandidate {
                provider_id,
                courier_code,
            });
        }
    }

    /// Exactly one provider.
    pub fn single(provider_id: ProviderId, courier_code: Option<String>) -> Self {
        FallbackPlan {
            candidates: vec![FallbackCandidate {
                provider_id,
                courier_code,
            }],
        }
    }

    /// Registry priority order; the adapter picks its default courier.
    pub fn from_priority(enabled: Vec<ProviderId>) -> Self {
        let mut plan = FallbackPlan::default();
        let mut seen = HashSet::new();
        for id in enabled {
            plan.push(&mut seen, id, None);
        }
        plan
    }

    /// One candidate per provider, in ranking order, each with its best-ranked courier.
    pub fn from_ranking(ranked: &[ShippingRate]) -> Self {
        let mut plan = FallbackPlan::default();
        let mut seen = HashSet::new();
        for rate in ranked {
            plan.push(&mut seen, rate.provider_id.clone(), Some(rate.courier_code.clone()));
        }
        plan
    }

    /// The chosen rate's provider first, then the other enabled providers.
    pub fn for_rate(rate: &ShippingRate, enabled: Vec<ProviderId>) -> Self {
        let mut plan = FallbackPlan::default();
        let mut seen = HashSet::new();
        plan.push(&mut seen, rate.provider_id.clone(), Some(rate.courier_code.clone()));
        for id in enabled {
            plan.push(&mut seen, id, None);
        }
        plan
    }

    pub fn candidates(&self) -> &[FallbackCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn provider_ids(&self) -> Vec<&ProviderId> {
        self.candidates.iter().map(|c| &c.provider_id).collect()
    }
}

/// Position of the attempt loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackState {
    Pending,
    Trying(ProviderId),
    Succeeded(ProviderId),
    FailedTryNext(ProviderId),
    ExhaustedAllFailed,
}

impl FallbackState {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            FallbackState::Succeeded(_) | FallbackState::ExhaustedAllFailed
        )
    }
}

impl std::fmt::Display for FallbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackState::Pending => write!(f, "pending"),
            FallbackState::Trying(id) => write!(f, "trying({id})"),
            FallbackState::Succeeded(id) => write!(f, "succeeded({id})"),
            FallbackState::FailedTryNext(id) => write!(f, "failed_try_next({id})"),
            FallbackState::ExhaustedAllFailed => write!(f, "exhausted_all_failed"),
        }
    }
}

/// Record of one provider attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentAttempt {
    pub attempt_number: u32,
    pub provider_id: ProviderId,
    #[serde(default)]
    pub courier_code: Option<String>,
    pub succeeded: bool,
    /// Failure reason; `None` on success.
    #[serde(default)]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// A booked shipment together with the attempts it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentOutcome {
    pub shipment: Shipment,
    pub attempts: Vec<ShipmentAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rate::ShippingMode;

    fn rate(provider: &str, courier: &str) -> ShippingRate {
        ShippingRate {
            provider_id: ProviderId::from(provider),
            provider_name: provider.to_string(),
            courier_name: courier.to_string(),
            courier_code: courier.to_string(),
            rate: 10.0,
            estimated_days: 2,
            mode: ShippingMode::Surface,
            available: true,
            features: None,
            performance: None,
            constraints: None,
            charges: None,
        }
    }

    fn ids(plan: &FallbackPlan) -> Vec<&str> {
        plan.provider_ids().into_iter().map(ProviderId::as_str).collect()
    }

    #[test]
    fn test_ranking_keeps_best_courier_per_provider() {
        let plan = FallbackPlan::from_ranking(&[rate("b", "b1"), rate("a", "a1"), rate("b", "b2")]);
        assert_eq!(ids(&plan), vec!["b", "a"]);
        assert_eq!(plan.candidates()[0].courier_code.as_deref(), Some("b1"));
    }

    #[test]
    fn test_chosen_rate_goes_first_then_priority_order() {
        let enabled = vec![ProviderId::from("a"), ProviderId::from("b"), ProviderId::from("c")];
        let plan = FallbackPlan::for_rate(&rate("b", "b9"), enabled);
        assert_eq!(ids(&plan), vec!["b", "a", "c"]);
        assert_eq!(plan.candidates()[1].courier_code, None);
    }

    #[test]
    fn test_priority_plan_has_no_duplicates() {
        let plan = FallbackPlan::from_priority(vec![ProviderId::from("a"), ProviderId::from("a")]);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_final_states() {
        assert!(FallbackState::Succeeded(ProviderId::from("a")).is_final());
        assert!(FallbackState::ExhaustedAllFailed.is_final());
        assert!(!FallbackState::FailedTryNext(ProviderId::from("a")).is_final());
        assert_eq!(FallbackState::Trying(ProviderId::from("x")).to_string(), "trying(x)");
    }
}
