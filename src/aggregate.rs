//! Lot-wide counts and the wall-clock history log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::occupancy::Occupancy;

/// Default wall-clock spacing between history samples.
pub const DEFAULT_HISTORY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OccupancyCounts {
    pub total: usize,
    pub vacant: usize,
    pub occupied: usize,
}

impl OccupancyCounts {
    /// Full recount; never incremental.
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Occupancy>,
    {
        let mut counts = Self::default();
        for status in statuses {
            counts.total += 1;
            match status {
                Occupancy::Vacant => counts.vacant += 1,
                Occupancy::Occupied => counts.occupied += 1,
            }
        }
        counts
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HistorySample {
    pub recorded_at: SystemTime,
    pub vacant: usize,
    pub occupied: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    pub interval: Duration,
    /// Oldest samples are evicted past this many; `None` keeps everything.
    pub capacity: Option<usize>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HISTORY_INTERVAL,
            capacity: None,
        }
    }
}

/// Recounts confirmed statuses every frame and samples them into history at
/// most once per interval of wall-clock time.
#[derive(Debug)]
pub struct Aggregator {
    settings: HistorySettings,
    counts: OccupancyCounts,
    history: VecDeque<HistorySample>,
    last_sample: SystemTime,
    evicted: u64,
}

impl Aggregator {
    /// `started_at` anchors the first interval.
    pub fn new(settings: HistorySettings, region_count: usize, started_at: SystemTime) -> Self {
        Self {
            settings,
            counts: OccupancyCounts {
                total: region_count,
                vacant: region_count,
                occupied: 0,
            },
            history: VecDeque::new(),
            last_sample: started_at,
            evicted: 0,
        }
    }

    /// Recounts without touching history.
    pub fn recount<I>(&mut self, statuses: I)
    where
        I: IntoIterator<Item = Occupancy>,
    {
        self.counts = OccupancyCounts::tally(statuses);
        debug_assert_eq!(self.counts.vacant + self.counts.occupied, self.counts.total);
    }

    /// Recounts and, when more than one interval has passed since the last
    /// sample, appends one. Returns true when a sample was appended.
    pub fn update<I>(&mut self, statuses: I, now: SystemTime) -> bool
    where
        I: IntoIterator<Item = Occupancy>,
    {
        self.recount(statuses);

        // A clock stepping backwards yields Err and never appends.
        let due = match now.duration_since(self.last_sample) {
            Ok(elapsed) => elapsed > self.settings.interval,
            Err(_) => false,
        };
        if !due {
            return false;
        }

        if let Some(capacity) = self.settings.capacity {
            while self.history.len() >= capacity.max(1) {
                self.history.pop_front();
                self.evicted += 1;
                if self.evicted == 1 {
                    log::warn!("history capacity {} reached; evicting oldest samples", capacity);
                }
            }
        }
        self.history.push_back(HistorySample {
            recorded_at: now,
            vacant: self.counts.vacant,
            occupied: self.counts.occupied,
        });
        self.last_sample = now;
        true
    }

    pub fn counts(&self) -> OccupancyCounts {
        self.counts
    }

    pub fn history(&self) -> &VecDeque<HistorySample> {
        &self.history
    }

    /// Samples dropped to honour the capacity bound.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: SystemTime, ms: u64) -> SystemTime {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn tally_sums_to_total() {
        let counts = OccupancyCounts::tally([
            Occupancy::Vacant,
            Occupancy::Occupied,
            Occupancy::Occupied,
        ]);
        assert_eq!(
            counts,
            OccupancyCounts {
                total: 3,
                vacant: 1,
                occupied: 2
            }
        );
        assert_eq!(OccupancyCounts::tally([]), OccupancyCounts::default());
    }

    #[test]
    fn history_appends_only_after_strictly_more_than_interval() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut agg = Aggregator::new(HistorySettings::default(), 2, t0);
        let statuses = [Occupancy::Vacant, Occupancy::Occupied];

        assert!(!agg.update(statuses, at(t0, 1_000)));
        assert!(!agg.update(statuses, at(t0, 5_000)));
        assert!(agg.update(statuses, at(t0, 5_001)));
        assert!(!agg.update(statuses, at(t0, 9_000)));
        assert!(agg.update(statuses, at(t0, 10_100)));

        assert_eq!(agg.history().len(), 2);
        assert_eq!(agg.history()[0].occupied, 1);
        assert_eq!(agg.counts().vacant, 1);
    }

    #[test]
    fn backwards_clock_never_appends() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut agg = Aggregator::new(HistorySettings::default(), 1, t0);
        let earlier = t0 - Duration::from_secs(60);
        assert!(!agg.update([Occupancy::Vacant], earlier));
        assert!(agg.history().is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let t0 = SystemTime::UNIX_EPOCH;
        let settings = HistorySettings {
            interval: Duration::from_secs(1),
            capacity: Some(2),
        };
        let mut agg = Aggregator::new(settings, 1, t0);
        for step in 1..=4u64 {
            let status = Occupancy::from_occupied(step % 2 == 0);
            assert!(agg.update([status], at(t0, step * 2_000)));
        }
        assert_eq!(agg.history().len(), 2);
        assert_eq!(agg.evicted(), 2);
        assert_eq!(agg.history()[0].recorded_at, at(t0, 6_000));
    }

    #[test]
    fn starts_all_vacant() {
        let agg = Aggregator::new(HistorySettings::default(), 4, SystemTime::UNIX_EPOCH);
        assert_eq!(
            agg.counts(),
            OccupancyCounts {
                total: 4,
                vacant: 4,
                occupied: 0
            }
        );
    }
}
