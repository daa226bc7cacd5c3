/// Lookup tables from carrier status vocabularies to `ShipmentStatus`.

use crate::models::shipment::ShipmentStatus;

/// Static, adapter-owned status table. Labels are compared after
/// normalization (upper-case, `_`/`-` treated as spaces, whitespace collapsed).
#[derive(Debug, Clone, Copy)]
pub struct StatusMap {
    entries: &'static [(&'static str, ShipmentStatus)],
}

impl StatusMap {
    pub const fn new(entries: &'static [(&'static str, ShipmentStatus)]) -> Self {
        StatusMap { entries }
    }

    /// Exact lookup. `None` for labels the table does not know.
    pub fn lookup(&self, label: &str) -> Option<ShipmentStatus> {
        let wanted = normalize(label);
        self.entries
            .iter()
            .find(|(known, _)| normalize(known) == wanted)
            .map(|(_, status)| *status)
    }

    /// Lookup with fallback: unknown labels resolve to the closest
    /// non-terminal state.
    pub fn resolve(&self, label: &str) -> ShipmentStatus {
        self.lookup(label)
            .unwrap_or_else(|| ShipmentStatus::closest_non_terminal(label))
    }
}

fn normalize(label: &str) -> String {
    label
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
