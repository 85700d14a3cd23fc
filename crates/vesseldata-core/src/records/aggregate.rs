//! Derived per-vessel state.

use std::collections::BTreeMap;

/// Totals computed from every enabled record on a vessel.
///
/// Cached on the vessel and dropped whenever its part list or record set
/// changes; recomputed on next read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VesselAggregate {
    pub part_count: usize,
    pub module_count: usize,
    pub enabled_count: usize,
    values: BTreeMap<String, f64>,
}

impl VesselAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to a named total
    pub fn add(&mut self, key: impl Into<String>, amount: f64) {
        *self.values.entry(key.into()).or_insert(0.0) += amount;
    }

    /// Named total, `0.0` if nothing contributed to it
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let mut agg = VesselAggregate::new();
        agg.add("habitat.volume", 2.0);
        agg.add("habitat.volume", 3.5);
        assert_eq!(agg.get("habitat.volume"), 5.5);
        assert_eq!(agg.get("missing"), 0.0);
        assert_eq!(agg.values().count(), 1);
    }
}
