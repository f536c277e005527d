//! Closed-form waveforms for muscle twitch and cardiac cycle

use physio_core::{Phase, PhysiologicalParameters};
use std::f64::consts::{FRAC_PI_2, PI};

/// Output of a single twitch `t` ms after its stimulus.
///
/// Never negative and never above `peak_amplitude` for sanitized parameters.
pub fn instantaneous_value(t: f64, params: &PhysiologicalParameters) -> f64 {
    let p = params.sanitized();

    // also rejects NaN
    if !(t >= p.latent_period_ms) {
        return 0.0;
    }

    let since_onset = t - p.latent_period_ms;
    if since_onset < p.contraction_duration_ms {
        let progress = progress(since_onset, p.contraction_duration_ms);
        return p.peak_amplitude * (progress * FRAC_PI_2).sin();
    }

    if p.sustained_plateau {
        return p.peak_amplitude;
    }

    let since_peak = since_onset - p.contraction_duration_ms;
    if since_peak < p.relaxation_duration_ms {
        let progress = progress(since_peak, p.relaxation_duration_ms);
        return p.peak_amplitude * (1.0 + (progress * PI).cos()) / 2.0;
    }

    0.0
}

/// Mechanical phase of a single twitch `t` ms after its stimulus
pub fn phase_at(t: f64, params: &PhysiologicalParameters) -> Phase {
    let p = params.sanitized();

    if !(t >= 0.0) {
        return Phase::Rest;
    }
    if t < p.latent_period_ms {
        return Phase::Latent;
    }
    let since_onset = t - p.latent_period_ms;
    if since_onset < p.contraction_duration_ms || p.sustained_plateau {
        return Phase::Contraction;
    }
    if since_onset - p.contraction_duration_ms < p.relaxation_duration_ms {
        return Phase::Relaxation;
    }
    Phase::Rest
}

/// Fraction of a window that has elapsed, clamped to [0, 1].
/// A zero-length window is already complete.
fn progress(elapsed: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        1.0
    } else {
        (elapsed / duration).clamp(0.0, 1.0)
    }
}

/// Cosine ease used between cardiac segment levels
fn ease(p: f64) -> f64 {
    (1.0 - (p.clamp(0.0, 1.0) * PI).cos()) / 2.0
}

/// Segments of one frog-heart cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardiacSegment {
    AtrialSystole,
    AtrialDiastole,
    AvDelay,
    VentricularSystole,
    VentricularDiastole,
}

impl CardiacSegment {
    /// Phase reported to the lever animation
    pub fn phase(&self) -> Phase {
        match self {
            CardiacSegment::AtrialSystole | CardiacSegment::VentricularSystole => Phase::Contraction,
            CardiacSegment::AtrialDiastole | CardiacSegment::VentricularDiastole => Phase::Relaxation,
            CardiacSegment::AvDelay => Phase::Latent,
        }
    }
}

const ATRIAL_PEAK: f64 = 0.3;
const ATRIAL_RESIDUAL: f64 = 0.1;
const VENTRICULAR_PEAK: f64 = 1.0;

/// (segment, start, end, level at start, level at end)
const CARDIAC_SEGMENTS: [(CardiacSegment, f64, f64, f64, f64); 5] = [
    (CardiacSegment::AtrialSystole, 0.0, 0.16, 0.0, ATRIAL_PEAK),
    (CardiacSegment::AtrialDiastole, 0.16, 0.32, ATRIAL_PEAK, ATRIAL_RESIDUAL),
    (CardiacSegment::AvDelay, 0.32, 0.40, ATRIAL_RESIDUAL, ATRIAL_RESIDUAL),
    (CardiacSegment::VentricularSystole, 0.40, 0.56, ATRIAL_RESIDUAL, VENTRICULAR_PEAK),
    (CardiacSegment::VentricularDiastole, 0.56, 1.0, VENTRICULAR_PEAK, 0.0),
];

fn cardiac_lookup(cycle_phase: f64) -> (CardiacSegment, f64) {
    let phase = if cycle_phase.is_finite() {
        cycle_phase.rem_euclid(1.0)
    } else {
        0.0
    };

    for (segment, start, end, from, to) in CARDIAC_SEGMENTS {
        if phase < end {
            let p = (phase - start) / (end - start);
            return (segment, from + (to - from) * ease(p));
        }
    }
    // rem_euclid can round up to exactly 1.0
    (CardiacSegment::VentricularDiastole, 0.0)
}

/// Unscaled contraction magnitude of the heart at a point in its cycle.
///
/// `cycle_phase` is a fraction of one period and wraps around.
pub fn cardiac_shape(cycle_phase: f64) -> f64 {
    cardiac_lookup(cycle_phase).1
}

/// Segment of the cycle containing `cycle_phase`
pub fn cardiac_segment(cycle_phase: f64) -> CardiacSegment {
    cardiac_lookup(cycle_phase).0
}
