// Adaptive rate control for store-mutating calls
//
// Pacing, not concurrency control: every store write waits a uniformly
// sampled delay in [min_delay, max_delay] first, and every call outcome
// feeds back into the bounds. No component may bypass this for store
// writes.
use crate::constants::{
    BASE_MAX_DELAY_SECS, BASE_MIN_DELAY_SECS, BATCH_BOUNDARY_GROWTH, DEFAULT_BATCH_SIZE_HINT,
    MAX_DELAY_CEILING_SECS, MIN_DELAY_CEILING_SECS, PENALTY_GROWTH_CAP, PENALTY_GROWTH_STEP,
    SUCCESS_DECAY, SUCCESS_DECAY_IDLE_SECS, TUNE_BATCH_GROWTH_PCT, TUNE_RELAX, TUNE_SAMPLE_SIZE,
};
use rand::Rng;
use std::time::{Duration, Instant};

/// Delay window and batch hint. Invariants:
/// `base_min <= min_delay <= 3.0`, `base_max <= max_delay <= 6.0`,
/// `min_delay <= max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateState {
    pub min_delay: f64,
    pub max_delay: f64,
    pub base_min: f64,
    pub base_max: f64,
    pub consecutive_penalty: u32,
    pub batch_size_hint: usize,
}

impl RateState {
    fn new(base_min: f64, base_max: f64) -> Self {
        let base_min = base_min.min(MIN_DELAY_CEILING_SECS).max(0.0);
        let base_max = base_max.min(MAX_DELAY_CEILING_SECS).max(base_min);
        RateState {
            min_delay: base_min,
            max_delay: base_max,
            base_min,
            base_max,
            consecutive_penalty: 0,
            batch_size_hint: DEFAULT_BATCH_SIZE_HINT,
        }
    }
}

/// Self-tuning backoff/acceleration controller.
///
/// Sole owner and mutator of [`RateState`]; the engine reports one signal
/// per store call and asks for [`next_delay`](Self::next_delay) before the
/// next one.
#[derive(Debug)]
pub struct AdaptiveRateController {
    state: RateState,
    last_adjustment: Instant,
    tuned: bool,
}

impl Default for AdaptiveRateController {
    fn default() -> Self {
        AdaptiveRateController::new()
    }
}

impl AdaptiveRateController {
    pub fn new() -> Self {
        AdaptiveRateController::with_bounds(BASE_MIN_DELAY_SECS, BASE_MAX_DELAY_SECS)
    }

    pub fn with_bounds(base_min: f64, base_max: f64) -> Self {
        AdaptiveRateController {
            state: RateState::new(base_min, base_max),
            last_adjustment: Instant::now(),
            tuned: false,
        }
    }

    pub fn state(&self) -> &RateState {
        &self.state
    }

    /// A store call succeeded. Bounds shrink 5% (floored at base) only if
    /// the window has been stable for more than 10 seconds, so a burst of
    /// successes does not collapse the delay right after a quota hit.
    pub fn on_success(&mut self) {
        self.on_success_at(Instant::now());
    }

    fn on_success_at(&mut self, now: Instant) {
        let idle = now.saturating_duration_since(self.last_adjustment);
        if idle <= Duration::from_secs(SUCCESS_DECAY_IDLE_SECS) {
            return;
        }
        self.state.min_delay = (self.state.min_delay * SUCCESS_DECAY).max(self.state.base_min);
        self.state.max_delay = (self.state.max_delay * SUCCESS_DECAY).max(self.state.base_max);
        if self.state.consecutive_penalty > 0 {
            self.state.consecutive_penalty -= 1;
        }
        self.last_adjustment = now;
    }

    /// The store reported a quota hit. Bounds are recomputed from base
    /// with a growth factor that scales with the consecutive penalty
    /// count, capped at the hard ceilings.
    pub fn on_rate_limited(&mut self) {
        self.state.consecutive_penalty += 1;
        let growth = 1.0
            + (PENALTY_GROWTH_STEP * self.state.consecutive_penalty as f64)
                .min(PENALTY_GROWTH_CAP);
        self.state.min_delay = (self.state.base_min * growth).min(MIN_DELAY_CEILING_SECS);
        self.state.max_delay = (self.state.base_max * growth).min(MAX_DELAY_CEILING_SECS);
        if self.state.min_delay > self.state.max_delay {
            self.state.max_delay = self.state.min_delay;
        }
        self.last_adjustment = Instant::now();
    }

    /// Proactive 10% widening applied every `batch_size_hint` records,
    /// independent of observed errors. Anticipates provider-side burst
    /// throttling.
    pub fn on_batch_boundary(&mut self) {
        self.state.min_delay =
            (self.state.min_delay * BATCH_BOUNDARY_GROWTH).min(MIN_DELAY_CEILING_SECS);
        self.state.max_delay =
            (self.state.max_delay * BATCH_BOUNDARY_GROWTH).min(MAX_DELAY_CEILING_SECS);
    }

    /// One-shot optimization per run: once enough successes have been
    /// sampled, grow the batch hint 20% and relax both bounds 10% toward
    /// (never below) base. Returns true when the tuning fires.
    pub fn tune_after_sample(&mut self, success_count: usize) -> bool {
        if self.tuned || success_count < TUNE_SAMPLE_SIZE {
            return false;
        }
        self.state.batch_size_hint += self.state.batch_size_hint * TUNE_BATCH_GROWTH_PCT / 100;
        self.state.min_delay = (self.state.min_delay * TUNE_RELAX).max(self.state.base_min);
        self.state.max_delay = (self.state.max_delay * TUNE_RELAX).max(self.state.base_max);
        self.tuned = true;
        true
    }

    /// Uniformly sampled pacing delay in the current window
    pub fn next_delay(&self) -> Duration {
        if self.state.max_delay <= self.state.min_delay {
            return Duration::from_secs_f64(self.state.min_delay.max(0.0));
        }
        let secs = rand::thread_rng().gen_range(self.state.min_delay..=self.state.max_delay);
        Duration::from_secs_f64(secs)
    }
}
