//! The per-frame occupancy pipeline.
//!
//! `OccupancyEngine` owns every piece of mutable state in a run:
//! - reference capture progress and snapshots
//! - one `DebounceState` per region, indexed by region position
//! - the shared sensitivity threshold
//! - lot-wide counts and history
//!
//! It has no knowledge of where frames come from or where reports go; see
//! `runner` for the loop that connects it to a source and a sink.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::aggregate::{Aggregator, HistorySample, HistorySettings, OccupancyCounts};
use crate::detect::{MetricEvaluator, MetricWeights, Phase, ReferenceCapture, ReferenceSettings, RegionMetrics};
use crate::frame::Frame;
use crate::occupancy::{DebounceState, Occupancy, DEFAULT_DETECT_DELAY};
use crate::region::RegionSet;
use crate::report::{RegionSummary, RunSummary};
use crate::tuning::{Command, Sensitivity};
use crate::KernelError;

/// Tunables of one engine instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub sensitivity: Sensitivity,
    pub detect_delay: Duration,
    pub metric: MetricWeights,
    pub reference: ReferenceSettings,
    pub history: HistorySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::default(),
            detect_delay: DEFAULT_DETECT_DELAY,
            metric: MetricWeights::default(),
            reference: ReferenceSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

/// Read-only view of one region after a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionStatus {
    pub region_id: u32,
    pub label: u32,
    pub occupancy: Occupancy,
    /// Present only on frames that were classified.
    pub metrics: Option<RegionMetrics>,
    /// Stream time at which an uncommitted flip started.
    pub pending_since_s: Option<f64>,
}

/// A committed status change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub region_id: u32,
    pub label: u32,
    pub from: Occupancy,
    pub to: Occupancy,
    pub at_s: f64,
}

/// Everything a display needs after one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp_s: f64,
    pub phase: Phase,
    pub sensitivity: f64,
    pub statuses: Vec<RegionStatus>,
    pub counts: OccupancyCounts,
    pub transitions: Vec<Transition>,
    pub history_appended: bool,
}

pub struct OccupancyEngine {
    regions: RegionSet,
    detect_delay: Duration,
    sensitivity: Sensitivity,
    evaluator: MetricEvaluator,
    reference: ReferenceCapture,
    states: Vec<DebounceState>,
    aggregator: Aggregator,
    phase: Option<Phase>,
    last_timestamp_s: Option<f64>,
    frames_processed: u64,
    transitions_committed: u64,
}

impl OccupancyEngine {
    pub fn new(regions: RegionSet, config: EngineConfig) -> Self {
        Self::with_start_time(regions, config, SystemTime::now())
    }

    /// Engine whose first history interval is measured from `started_at`.
    pub fn with_start_time(regions: RegionSet, config: EngineConfig, started_at: SystemTime) -> Self {
        let count = regions.len();
        if count == 0 {
            log::warn!("no regions configured; reports will be empty");
        }
        Self {
            detect_delay: config.detect_delay,
            sensitivity: config.sensitivity,
            evaluator: MetricEvaluator::new(config.metric),
            reference: ReferenceCapture::new(config.reference, count),
            states: vec![DebounceState::default(); count],
            aggregator: Aggregator::new(config.history, count, started_at),
            phase: None,
            last_timestamp_s: None,
            frames_processed: 0,
            transitions_committed: 0,
            regions,
        }
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, KernelError> {
        self.process_frame_at(frame, SystemTime::now())
    }

    /// Runs one frame through capture, scoring, debounce and aggregation.
    /// `now` is the wall-clock time used only for history sampling.
    pub fn process_frame_at(
        &mut self,
        frame: &Frame,
        now: SystemTime,
    ) -> Result<FrameReport, KernelError> {
        let t = frame.timestamp_s;
        let previous = self.last_timestamp_s.unwrap_or(0.0);
        if !t.is_finite() || self.last_timestamp_s.is_some_and(|prev| t < prev) {
            return Err(KernelError::TimestampRegression {
                previous,
                current: t,
            });
        }

        let phase = self.reference.observe(frame, &self.regions)?;
        if self.phase.is_some_and(|p| !p.is_detecting()) && phase.is_detecting() {
            log::info!(
                "detection started at frame {} ({:.2}s), sensitivity {}",
                frame.index,
                t,
                self.sensitivity
            );
        }

        let threshold = self.sensitivity.value();
        let mut metrics: Vec<Option<RegionMetrics>> = vec![None; self.regions.len()];
        let mut transitions = Vec::new();

        if phase.is_detecting() {
            // Crop everything first so a bad frame leaves every region untouched.
            let crops = self
                .regions
                .iter()
                .map(|region| frame.region_pixels(region))
                .collect::<Result<Vec<_>, _>>()?;
            for (pos, (region, crop)) in self.regions.iter().zip(&crops).enumerate() {
                let m = self
                    .evaluator
                    .evaluate(crop, self.reference.snapshot(pos), region.mask());
                let candidate = Occupancy::from_occupied(m.is_occupied(threshold));
                log::debug!(
                    "frame {} space {}: texture={:.3} diff={:?} score={:.3} threshold={:.1} candidate={}",
                    frame.index,
                    region.label(),
                    m.texture,
                    m.diff_ratio,
                    m.score,
                    threshold,
                    candidate
                );
                metrics[pos] = Some(m);

                let state = &mut self.states[pos];
                let from = state.confirmed();
                if let Some(to) = state.step(candidate, t, self.detect_delay) {
                    log::info!("space {} {} -> {} at {:.2}s", region.label(), from, to, t);
                    transitions.push(Transition {
                        region_id: region.id(),
                        label: region.label(),
                        from,
                        to,
                        at_s: t,
                    });
                }
            }
        }

        // History starts with detection; initialization frames only recount.
        let confirmed = self.states.iter().map(DebounceState::confirmed);
        let history_appended = if phase.is_detecting() {
            self.aggregator.update(confirmed, now)
        } else {
            self.aggregator.recount(confirmed);
            false
        };

        self.transitions_committed += transitions.len() as u64;
        self.frames_processed += 1;
        self.last_timestamp_s = Some(t);
        self.phase = Some(phase);

        let statuses = self
            .regions
            .iter()
            .zip(&self.states)
            .zip(metrics)
            .map(|((region, state), metrics)| RegionStatus {
                region_id: region.id(),
                label: region.label(),
                occupancy: state.confirmed(),
                metrics,
                pending_since_s: state.pending_since(),
            })
            .collect();

        Ok(FrameReport {
            frame_index: frame.index,
            timestamp_s: t,
            phase,
            sensitivity: threshold,
            statuses,
            counts: self.aggregator.counts(),
            transitions,
            history_appended,
        })
    }

    /// Adjusts the shared threshold. Takes effect on the next frame; already
    /// computed candidates are not re-evaluated.
    pub fn apply_command(&mut self, command: Command) -> Sensitivity {
        let before = self.sensitivity;
        let after = self.sensitivity.apply(command);
        if after == before {
            log::info!("sensitivity already at floor {}", after);
        } else {
            log::info!("sensitivity {} -> {}", before, after);
        }
        after
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn detect_delay(&self) -> Duration {
        self.detect_delay
    }

    /// Phase of the most recent frame; `None` before the first one.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Confirmed status of the region with `id`.
    pub fn status(&self, id: u32) -> Option<Occupancy> {
        self.regions
            .position(id)
            .map(|pos| self.states[pos].confirmed())
    }

    pub fn counts(&self) -> OccupancyCounts {
        self.aggregator.counts()
    }

    pub fn history(&self) -> &VecDeque<HistorySample> {
        self.aggregator.history()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn has_reference(&self, id: u32) -> bool {
        self.regions
            .position(id)
            .is_some_and(|pos| self.reference.is_set(pos))
    }

    /// Final statistics of the run so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames_processed: self.frames_processed,
            last_timestamp_s: self.last_timestamp_s,
            sensitivity: self.sensitivity.value(),
            counts: self.aggregator.counts(),
            transitions: self.transitions_committed,
            regions: self
                .regions
                .iter()
                .zip(&self.states)
                .enumerate()
                .map(|(pos, (region, state))| RegionSummary {
                    region_id: region.id(),
                    label: region.label(),
                    occupancy: state.confirmed(),
                    has_reference: self.reference.is_set(pos),
                })
                .collect(),
            history: self.aggregator.history().iter().copied().collect(),
            history_evicted: self.aggregator.evicted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionDefinition;
    use image::Luma;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            reference: ReferenceSettings {
                discard_frames: 1,
                collect_frames: 2,
            },
            ..EngineConfig::default()
        }
    }

    fn one_space() -> RegionSet {
        RegionSet::from_definitions(&[RegionDefinition::rect(0, 2, 2, 11, 11)]).unwrap()
    }

    /// 16x16 frame; when `car` is set the space is half covered by a bright block.
    fn frame(index: u64, t: f64, car: bool) -> Frame {
        let mut f = Frame::uniform(index, t, 16, 16, 90);
        if car {
            for y in 2..12 {
                for x in 2..7 {
                    f.image_mut().put_pixel(x, y, Luma([200]));
                }
            }
        }
        f
    }

    fn run(engine: &mut OccupancyEngine, frames: &[(f64, bool)]) -> Vec<FrameReport> {
        let t0 = SystemTime::UNIX_EPOCH;
        frames
            .iter()
            .enumerate()
            .map(|(i, &(t, car))| {
                engine
                    .process_frame_at(&frame(i as u64, t, car), t0)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn initialization_frames_are_not_classified() {
        let mut engine = OccupancyEngine::with_start_time(one_space(), quick_config(), SystemTime::UNIX_EPOCH);
        let reports = run(&mut engine, &[(0.0, true), (0.1, false), (0.2, true), (0.3, false)]);
        assert!(matches!(reports[0].phase, Phase::Warmup { .. }));
        assert!(matches!(reports[1].phase, Phase::Calibrating { frame: 1, .. }));
        assert!(matches!(reports[2].phase, Phase::Calibrating { frame: 2, .. }));
        assert!(reports[..3].iter().all(|r| r.statuses[0].metrics.is_none()));
        assert_eq!(reports[3].phase, Phase::Detecting);
        assert_eq!(reports[3].statuses[0].metrics.unwrap().score, 0.0);
        assert!(engine.has_reference(0));
    }

    #[test]
    fn sustained_vehicle_flips_once_after_delay() {
        let mut engine = OccupancyEngine::with_start_time(one_space(), quick_config(), SystemTime::UNIX_EPOCH);
        let mut frames = vec![(0.0, false), (0.1, false), (0.2, false)];
        for i in 0..15 {
            frames.push((1.0 + i as f64 * 0.1, true));
        }
        let reports = run(&mut engine, &frames);

        let flips: Vec<&Transition> = reports.iter().flat_map(|r| &r.transitions).collect();
        assert_eq!(flips.len(), 1);
        assert_eq!(flips[0].to, Occupancy::Occupied);
        assert_eq!(flips[0].label, 1);
        assert!((flips[0].at_s - 2.0).abs() < 1e-9);
        assert_eq!(engine.status(0), Some(Occupancy::Occupied));
        assert_eq!(engine.counts().occupied, 1);
    }

    #[test]
    fn flicker_is_absorbed() {
        let mut engine = OccupancyEngine::with_start_time(one_space(), quick_config(), SystemTime::UNIX_EPOCH);
        let reports = run(
            &mut engine,
            &[(0.0, false), (0.1, false), (0.2, false), (10.0, true), (10.5, false), (12.0, false)],
        );
        assert_eq!(reports[3].statuses[0].pending_since_s, Some(10.0));
        assert!(reports.iter().all(|r| r.transitions.is_empty()));
        assert_eq!(engine.status(0), Some(Occupancy::Vacant));
    }

    #[test]
    fn command_applies_from_next_frame() {
        let mut engine = OccupancyEngine::with_start_time(one_space(), quick_config(), SystemTime::UNIX_EPOCH);
        run(&mut engine, &[(0.0, false), (0.1, false), (0.2, false)]);
        for _ in 0..3 {
            engine.apply_command(Command::DecreaseSensitivity);
        }
        let report = engine
            .process_frame_at(&frame(3, 0.3, false), SystemTime::UNIX_EPOCH)
            .unwrap();
        assert!((report.sensitivity - 1.7).abs() < 1e-9);
    }

    /// Score of the half-covered space under default weights.
    fn car_score() -> f64 {
        let mut engine = OccupancyEngine::with_start_time(one_space(), quick_config(), SystemTime::UNIX_EPOCH);
        let reports = run(&mut engine, &[(0.0, false), (0.1, false), (0.2, false), (1.0, true)]);
        reports[3].statuses[0].metrics.unwrap().score
    }

    #[test]
    fn borderline_score_follows_sensitivity_commands() {
        let score = car_score();
        assert!(score > 1.0, "{score}");
        let config = EngineConfig {
            sensitivity: Sensitivity::new(score + 0.25),
            ..quick_config()
        };
        let mut engine = OccupancyEngine::with_start_time(one_space(), config, SystemTime::UNIX_EPOCH);
        let mut index = 0u64;
        let mut next = |engine: &mut OccupancyEngine, t: f64, car: bool| {
            let report = engine
                .process_frame_at(&frame(index, t, car), SystemTime::UNIX_EPOCH)
                .unwrap();
            index += 1;
            report
        };
        for t in [0.0, 0.1, 0.2] {
            next(&mut engine, t, false);
        }

        // Threshold above the score: the vehicle is not a candidate.
        for t in [1.0, 1.5] {
            let report = next(&mut engine, t, true);
            let status = &report.statuses[0];
            assert!((status.metrics.unwrap().score - score).abs() < 1e-9);
            assert_eq!(status.pending_since_s, None);
            assert!(report.transitions.is_empty());
        }

        // Two steps leave the threshold above the score.
        engine.apply_command(Command::IncreaseSensitivity);
        engine.apply_command(Command::IncreaseSensitivity);
        assert_eq!(next(&mut engine, 1.8, true).statuses[0].pending_since_s, None);

        // The third drops it below; the very next frame starts the flip.
        engine.apply_command(Command::IncreaseSensitivity);
        assert!(engine.sensitivity().value() < score);
        let report = next(&mut engine, 2.0, true);
        assert_eq!(report.statuses[0].pending_since_s, Some(2.0));
        assert_eq!(report.statuses[0].occupancy, Occupancy::Vacant);
        assert!(next(&mut engine, 2.5, true).transitions.is_empty());
        let report = next(&mut engine, 3.0, true);
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].to, Occupancy::Occupied);

        // Raising it back above the score releases the space after the delay.
        engine.apply_command(Command::DecreaseSensitivity);
        let report = next(&mut engine, 3.5, true);
        assert_eq!(report.statuses[0].occupancy, Occupancy::Occupied);
        assert_eq!(report.statuses[0].pending_since_s, Some(3.5));
        let report = next(&mut engine, 4.5, true);
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].to, Occupancy::Vacant);
    }

    #[test]
    fn history_waits_for_detection() {
        let config = EngineConfig {
            history: HistorySettings {
                interval: Duration::from_secs(1),
                capacity: None,
            },
            ..quick_config()
        };
        let start = SystemTime::UNIX_EPOCH;
        let mut engine = OccupancyEngine::with_start_time(one_space(), config, start);
        let late = start + Duration::from_secs(10);

        for (i, t) in [0.0, 0.1, 0.2].into_iter().enumerate() {
            let report = engine.process_frame_at(&frame(i as u64, t, false), late).unwrap();
            assert!(!report.phase.is_detecting());
            assert!(!report.history_appended);
            assert_eq!(report.counts.vacant, 1);
        }
        assert!(engine.history().is_empty());

        let report = engine.process_frame_at(&frame(3, 0.3, false), late).unwrap();
        assert_eq!(report.phase, Phase::Detecting);
        assert!(report.history_appended);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn out_of_frame_crop_leaves_every_region_untouched() {
        let regions = RegionSet::from_definitions(&[
            RegionDefinition::rect(0, 0, 0, 3, 3),
            RegionDefinition::rect(1, 10, 0, 13, 3),
        ])
        .unwrap();
        let lot_frame = |index: u64, t: f64, width: u32, car: bool| {
            let mut f = Frame::uniform(index, t, width, 16, 90);
            if car {
                for y in 0..4 {
                    for x in 0..4 {
                        f.image_mut().put_pixel(x, y, Luma([200]));
                    }
                }
            }
            f
        };
        let now = SystemTime::UNIX_EPOCH;
        let mut engine = OccupancyEngine::with_start_time(regions, quick_config(), now);
        for (i, t) in [0.0, 0.1, 0.2].into_iter().enumerate() {
            engine.process_frame_at(&lot_frame(i as u64, t, 16, false), now).unwrap();
        }

        // Space 0 fits the narrow frame, space 1 does not.
        let err = engine
            .process_frame_at(&lot_frame(3, 1.0, 8, true), now)
            .unwrap_err();
        assert!(matches!(err, KernelError::RegionOutOfFrame { id: 1, .. }));
        assert_eq!(engine.frames_processed(), 3);

        // Space 0's deviation starts with the next good frame, not the rejected one.
        let report = engine.process_frame_at(&lot_frame(4, 1.5, 16, true), now).unwrap();
        assert_eq!(report.statuses[0].pending_since_s, Some(1.5));
        let report = engine.process_frame_at(&lot_frame(5, 2.0, 16, true), now).unwrap();
        assert!(report.transitions.is_empty());
        assert_eq!(engine.status(0), Some(Occupancy::Vacant));
    }

    #[test]
    fn timestamp_regression_is_rejected() {
        let mut engine = OccupancyEngine::new(one_space(), quick_config());
        engine.process_frame(&frame(0, 5.0, false)).unwrap();
        let err = engine.process_frame(&frame(1, 4.0, false)).unwrap_err();
        assert!(matches!(
            err,
            KernelError::TimestampRegression { previous, current } if previous == 5.0 && current == 4.0
        ));
        // Equal timestamps are allowed.
        assert!(engine.process_frame(&frame(2, 5.0, false)).is_ok());
    }

    #[test]
    fn empty_region_set_runs_with_empty_output() {
        let mut engine = OccupancyEngine::new(RegionSet::default(), EngineConfig::default());
        for i in 0..60 {
            let report = engine.process_frame(&frame(i, i as f64 * 0.1, false)).unwrap();
            assert!(report.statuses.is_empty());
            assert_eq!(report.counts, OccupancyCounts::default());
        }
        assert_eq!(engine.summary().frames_processed, 60);
    }

    #[test]
    fn counts_always_sum_to_total() {
        let regions = RegionSet::from_definitions(&[
            RegionDefinition::rect(0, 2, 2, 11, 11),
            RegionDefinition::rect(1, 12, 2, 15, 11),
        ])
        .unwrap();
        let mut engine = OccupancyEngine::with_start_time(regions, quick_config(), SystemTime::UNIX_EPOCH);
        let mut frames = vec![(0.0, false), (0.1, false), (0.2, false)];
        frames.extend((0..30).map(|i| (1.0 + i as f64 * 0.1, i % 7 < 5)));
        for report in run(&mut engine, &frames) {
            assert_eq!(report.counts.total, 2);
            assert_eq!(report.counts.vacant + report.counts.occupied, 2);
        }
    }
}
