/*
 * KTZ Tunables
 *
 * The knobs of the KTZ policy, collected in one struct that is handed to each
 * policy instance at construction. Nothing here is global: two cores with
 * different tunables can coexist, which is what the tests rely on.
 *
 * Tunables can also be taken from the kernel command line, e.g.
 * `ktz.slice=12 ktz.slice_min=2 ktz.interact=40`.
 */

use super::error::{SchedError, SchedResult};

/// Fixed-point shift applied to run/sleep tick counts
pub const TICK_SHIFT: u32 = 10;

/// Upper bound of the interactivity score
pub const INTERACT_MAX: u32 = 100;

/// Midpoint of the interactivity score
pub const INTERACT_HALF: u32 = INTERACT_MAX / 2;

/// Default interactivity threshold
pub const INTERACT_THRESH: u32 = 30;

/// Seconds of history kept by the CPU usage estimator
pub const CPU_WINDOW_SECS: u32 = 10;

/// Seconds of run/sleep history kept by decay
pub const HISTORY_SECS: u32 = 5;

/// Loads at or above this get the minimum slice
pub const SLICE_MIN_DIVISOR: u32 = 6;

/// Default timer frequency
pub const DEFAULT_HZ: u32 = 100;

/// Scheduling tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Timer ticks per second
    pub hz: u32,
    /// Run time charged per tick (fixed point, `1 << TICK_SHIFT` = one tick)
    pub tick_increment: u32,
    /// Score below which a task counts as interactive
    pub interactivity_threshold: u32,
    /// Slice handed out without contention, in ticks
    pub base_slice: u32,
    /// Slice floor under heavy load, in ticks
    pub min_slice: u32,
    /// Load at which the slice drops straight to `min_slice`
    pub min_slice_divisor: u32,
    /// Decay window `W` for run + sleep history
    pub decay_window: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self::scaled(DEFAULT_HZ, (DEFAULT_HZ * HISTORY_SECS) << TICK_SHIFT)
    }
}

impl Tunables {
    /// Defaults scaled to a timer frequency
    ///
    /// Fails for a zero frequency and for one whose decay window does not
    /// fit the history counters.
    pub fn for_hz(hz: u32) -> SchedResult<Self> {
        if hz == 0 {
            return Err(SchedError::InvalidTunables("hz must be non-zero"));
        }
        let window = u64::from(hz)
            .checked_mul(u64::from(HISTORY_SECS))
            .and_then(|w| w.checked_mul(1 << TICK_SHIFT))
            .filter(|w| *w <= u64::from(u32::MAX / 2))
            .ok_or(SchedError::InvalidTunables("hz too large for the decay window"))?;
        Ok(Self::scaled(hz, window as u32))
    }

    fn scaled(hz: u32, decay_window: u32) -> Self {
        Self {
            hz,
            tick_increment: 1 << TICK_SHIFT,
            interactivity_threshold: INTERACT_THRESH,
            base_slice: (hz / 10).max(1),
            min_slice: (hz / 10 / SLICE_MIN_DIVISOR).max(1),
            min_slice_divisor: SLICE_MIN_DIVISOR,
            decay_window,
        }
    }

    pub fn with_slices(mut self, base_slice: u32, min_slice: u32) -> Self {
        self.base_slice = base_slice;
        self.min_slice = min_slice;
        self
    }

    pub fn with_interactivity_threshold(mut self, threshold: u32) -> Self {
        self.interactivity_threshold = threshold;
        self
    }

    pub fn with_decay_window(mut self, window: u32) -> Self {
        self.decay_window = window;
        self
    }

    pub fn with_tick_increment(mut self, increment: u32) -> Self {
        self.tick_increment = increment;
        self
    }

    /// Length of the CPU usage window in ticks
    pub fn cpu_window(&self) -> u64 {
        u64::from(self.hz) * u64::from(CPU_WINDOW_SECS)
    }

    /// Longest history the CPU usage estimator keeps before rescaling
    pub fn cpu_window_max(&self) -> u64 {
        self.cpu_window() + u64::from(self.hz)
    }

    /// Largest run + sleep history a forked child inherits
    pub fn fork_history(&self) -> u32 {
        (self.hz / 2).max(1).saturating_mul(self.tick_increment)
    }

    /// Check that the tunables cannot drive the policy into a bad state
    pub fn validate(&self) -> SchedResult<()> {
        if self.hz == 0 {
            return Err(SchedError::InvalidTunables("hz must be non-zero"));
        }
        if self.tick_increment == 0 {
            return Err(SchedError::InvalidTunables("tick_increment must be non-zero"));
        }
        if self.min_slice == 0 {
            return Err(SchedError::InvalidTunables("min_slice must be at least one tick"));
        }
        if self.min_slice > self.base_slice {
            return Err(SchedError::InvalidTunables("min_slice exceeds base_slice"));
        }
        if self.min_slice_divisor < 2 {
            return Err(SchedError::InvalidTunables("min_slice_divisor must be at least 2"));
        }
        if self.interactivity_threshold > INTERACT_MAX {
            return Err(SchedError::InvalidTunables("interactivity threshold above score range"));
        }
        // Decay scales by fifths and must be able to double the window.
        if self.decay_window < 5 || self.decay_window > u32::MAX / 2 {
            return Err(SchedError::InvalidTunables("decay window out of range"));
        }
        Ok(())
    }

    /// Apply `ktz.*` parameters from a kernel command line on top of `self`
    ///
    /// Tokens that are not `ktz.` parameters are ignored. Unknown `ktz.` keys
    /// are logged and skipped. A value that does not parse rejects the whole
    /// command line. When `ktz.hz` is given, the other defaults are rescaled
    /// to it before the remaining keys are applied.
    pub fn from_cmdline(cmdline: &str) -> SchedResult<Self> {
        let mut tunables = Self::default();

        if let Some(hz) = param(cmdline, "ktz.hz") {
            tunables = Self::for_hz(parse_value(hz)?)?;
        }

        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let Some(name) = key.strip_prefix("ktz.") else {
                continue;
            };

            match name {
                "hz" => {}
                "slice" => tunables.base_slice = parse_value(value)?,
                "slice_min" => tunables.min_slice = parse_value(value)?,
                "interact" => tunables.interactivity_threshold = parse_value(value)?,
                "tickincr" => tunables.tick_increment = parse_value(value)?,
                "decay" => tunables.decay_window = parse_value(value)?,
                _ => log::warn!("ktz: ignoring unknown parameter {}", key),
            }
        }

        tunables.validate()?;
        Ok(tunables)
    }
}

fn param<'a>(cmdline: &'a str, key: &str) -> Option<&'a str> {
    cmdline
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn parse_value(value: &str) -> SchedResult<u32> {
    value
        .parse()
        .map_err(|_| SchedError::InvalidTunables("malformed numeric parameter"))
}
