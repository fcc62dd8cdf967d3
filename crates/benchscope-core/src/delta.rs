//! Lap deltas: snapshot at benchmark start, diff at benchmark stop.

use std::collections::BTreeMap;

/// Flat snapshot of cumulative counters, keyed by a device-chosen name.
pub type Snapshot = BTreeMap<String, f64>;

/// Holds at most one start-of-lap snapshot.
#[derive(Debug, Default, Clone)]
pub struct LapDelta {
    start: Option<Snapshot>,
}

impl LapDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start-of-lap snapshot, replacing any previous one.
    pub fn begin(&mut self, snapshot: Snapshot) {
        self.start = Some(snapshot);
    }

    pub fn has_snapshot(&self) -> bool {
        self.start.is_some()
    }

    /// Diff `current` against the start snapshot and clear it.
    ///
    /// Only keys present in both snapshots are diffed. Without a start
    /// snapshot the result is empty.
    pub fn finish(&mut self, current: &Snapshot) -> Snapshot {
        let Some(start) = self.start.take() else {
            return Snapshot::new();
        };
        current
            .iter()
            .filter_map(|(key, end)| start.get(key).map(|begin| (key.clone(), end - begin)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, f64)]) -> Snapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn diff_of_common_keys() {
        let mut delta = LapDelta::new();
        delta.begin(snap(&[("rally0.young", 1000.0), ("rally0.old", 500.0), ("gone", 1.0)]));
        let diff = delta.finish(&snap(&[
            ("rally0.young", 2500.0),
            ("rally0.old", 1200.0),
            ("new", 3.0),
        ]));
        assert_eq!(diff, snap(&[("rally0.old", 700.0), ("rally0.young", 1500.0)]));
    }

    #[test]
    fn nothing_without_a_snapshot() {
        let mut delta = LapDelta::new();
        assert!(delta.finish(&snap(&[("a", 1.0)])).is_empty());
    }

    #[test]
    fn each_lap_uses_a_fresh_snapshot() {
        let mut delta = LapDelta::new();
        delta.begin(snap(&[("a", 10.0)]));
        assert_eq!(delta.finish(&snap(&[("a", 15.0)])), snap(&[("a", 5.0)]));
        assert!(!delta.has_snapshot());
        // A stop without a new start emits nothing.
        assert!(delta.finish(&snap(&[("a", 20.0)])).is_empty());

        delta.begin(snap(&[("a", 20.0)]));
        delta.begin(snap(&[("a", 22.0)]));
        assert_eq!(delta.finish(&snap(&[("a", 30.0)])), snap(&[("a", 8.0)]));
    }
}
