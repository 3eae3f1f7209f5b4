use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{LogEvent, Severity};

/// Order in which buckets are presented.
pub const DISPLAY_ORDER: [Severity; 4] = [Severity::Error, Severity::Attention, Severity::Success, Severity::Normal];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: usize,
}

/// Derived view of a log window. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSnapshot {
    pub total: usize,
    /// Non-empty buckets only, in [`DISPLAY_ORDER`].
    pub distribution: Vec<SeverityCount>,
    /// day -> system -> count. Sparse: absent pairs are zero.
    pub daily: BTreeMap<NaiveDate, BTreeMap<String, usize>>,
}

impl AggregateSnapshot {
    pub fn count(&self, severity: Severity) -> usize {
        self.distribution
            .iter()
            .find(|c| c.severity == severity)
            .map_or(0, |c| c.count)
    }

    pub fn daily_count(&self, day: NaiveDate, system_id: &str) -> usize {
        self.daily
            .get(&day)
            .and_then(|systems| systems.get(system_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn systems(&self) -> BTreeSet<&str> {
        self.daily.values().flat_map(|s| s.keys().map(String::as_str)).collect()
    }
}

pub struct StatsAggregator;

impl StatsAggregator {
    /// Pure function of the window. Days are UTC calendar days.
    pub fn compute(window: &[LogEvent]) -> AggregateSnapshot {
        let mut buckets: BTreeMap<Severity, usize> = BTreeMap::new();
        let mut daily: BTreeMap<NaiveDate, BTreeMap<String, usize>> = BTreeMap::new();

        for event in window {
            *buckets.entry(event.level).or_default() += 1;
            *daily
                .entry(event.created_at.date_naive())
                .or_default()
                .entry(event.system_id.clone())
                .or_default() += 1;
        }

        let distribution = DISPLAY_ORDER
            .iter()
            .filter_map(|&severity| {
                let count = buckets.get(&severity).copied().unwrap_or(0);
                (count > 0).then_some(SeverityCount { severity, count })
            })
            .collect();

        AggregateSnapshot { total: window.len(), distribution, daily }
    }
}

/// System names present in the backend's pre-aggregated daily rows, in first-seen order.
pub fn system_keys(rows: &[protocol::DailyStatsRow]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for row in rows {
        for key in row.counts.keys() {
            if seen.insert(key.as_str()) {
                keys.push(key.clone());
            }
        }
    }
    keys
}
