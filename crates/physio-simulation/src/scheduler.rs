//! Stimulus scheduling for repeated-stimulus experiments

use physio_core::{PhysiologicalParameters, StimulusEvent};
use serde::{Deserialize, Serialize};

use crate::resolver::stimulus_interval_ms;
use crate::waveform::instantaneous_value;

/// Source of stimulus onsets for a run
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusScheduler {
    /// `Some` for a periodic train, `None` for externally triggered stimuli
    interval_ms: Option<f64>,
    /// Periodic trains deliver no onset at or after this time
    train_ms: f64,
    events: Vec<StimulusEvent>,
}

impl StimulusScheduler {
    /// Train at `frequency_hz` starting at t = 0 and lasting `train_ms`
    pub fn periodic(frequency_hz: f64, train_ms: f64) -> Self {
        Self {
            interval_ms: Some(stimulus_interval_ms(frequency_hz)),
            train_ms: if train_ms.is_nan() { 0.0 } else { train_ms.max(0.0) },
            events: Vec::new(),
        }
    }

    /// Stimuli delivered one at a time by the user
    pub fn external() -> Self {
        Self {
            interval_ms: None,
            train_ms: f64::INFINITY,
            events: Vec::new(),
        }
    }

    pub fn interval_ms(&self) -> Option<f64> {
        self.interval_ms
    }

    /// Collect every scheduled onset reached by `elapsed_ms`.
    ///
    /// Onsets land on their exact scheduled times, so irregular ticks never
    /// yield more than one event per interval. Returns the events appended.
    pub fn due(&mut self, elapsed_ms: f64) -> &[StimulusEvent] {
        let first_new = self.events.len();
        let Some(interval) = self.interval_ms else {
            return &self.events[first_new..];
        };

        loop {
            let index = self.events.len();
            let onset = index as f64 * interval;
            if onset >= self.train_ms || !(onset <= elapsed_ms) {
                break;
            }
            self.events.push(StimulusEvent { index, onset_ms: onset });
        }

        &self.events[first_new..]
    }

    /// Deliver an external stimulus at `at_ms`.
    ///
    /// Onsets are unique and increasing; a trigger that is not strictly later
    /// than the previous onset is dropped.
    pub fn trigger(&mut self, at_ms: f64) -> Option<StimulusEvent> {
        if at_ms.is_nan() {
            return None;
        }
        if let Some(last) = self.events.last() {
            if at_ms <= last.onset_ms {
                return None;
            }
        }
        let event = StimulusEvent {
            index: self.events.len(),
            onset_ms: at_ms.max(0.0),
        };
        self.events.push(event);
        Some(event)
    }

    pub fn events(&self) -> &[StimulusEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&StimulusEvent> {
        self.events.last()
    }
}

/// Staircase reinforcement of early stimuli in a train
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Treppe {
    /// Added strength per stimulus index
    pub step: f64,
    /// Largest reinforcement factor
    pub cap: f64,
}

impl Treppe {
    /// No staircase: every stimulus has factor 1
    pub const NONE: Treppe = Treppe { step: 0.0, cap: 1.0 };
}

impl Default for Treppe {
    fn default() -> Self {
        Self { step: 0.1, cap: 1.5 }
    }
}

/// Reinforcement factor of the stimulus with the given index
pub fn treppe_factor(index: usize, treppe: &Treppe) -> f64 {
    let factor = (1.0 + index as f64 * treppe.step.max(0.0)).min(treppe.cap);
    factor.max(0.0)
}

/// Summed tension of overlapping twitches, saturating at `ceiling`.
///
/// `params_for` supplies the twitch of each stimulus.
pub fn summed_tension<F>(
    t: f64,
    events: &[StimulusEvent],
    params_for: F,
    treppe: &Treppe,
    ceiling: f64,
) -> f64
where
    F: Fn(&StimulusEvent) -> PhysiologicalParameters,
{
    let total: f64 = events
        .iter()
        .take_while(|event| event.onset_ms <= t)
        .map(|event| instantaneous_value(t - event.onset_ms, &params_for(event)) * treppe_factor(event.index, treppe))
        .sum();

    total.min(ceiling.max(0.0))
}

/// Cumulative fatigue of a muscle under repeated stimulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueTracker {
    /// Stimuli delivered before fatigue starts to build
    pub warmup: usize,
    /// Fatigue added per stimulus after warm-up
    pub increment: f64,
    /// Level at which the muscle is fully fatigued
    pub max_level: f64,
    level: f64,
    delivered: usize,
}

impl FatigueTracker {
    pub fn new(warmup: usize, increment: f64, max_level: f64) -> Self {
        Self {
            warmup,
            increment: if increment.is_nan() { 0.0 } else { increment.max(0.0) },
            max_level: if max_level.is_nan() { 0.0 } else { max_level.clamp(0.0, 1.0) },
            level: 0.0,
            delivered: 0,
        }
    }

    /// Account for one more stimulus; returns the level its twitch sees
    pub fn record_stimulus(&mut self) -> f64 {
        self.delivered += 1;
        if self.delivered > self.warmup {
            self.level = (self.level + self.increment).min(self.max_level);
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn is_exhausted(&self) -> bool {
        self.level >= self.max_level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
        self.delivered = 0;
    }
}

impl Default for FatigueTracker {
    fn default() -> Self {
        Self::new(3, 0.08, 0.9)
    }
}
