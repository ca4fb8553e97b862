/*
 * Run/Sleep Accounting
 *
 * Keeps a bounded, decaying history of how long each task ran versus slept
 * and derives two numbers from it:
 *
 * - the interactivity score (0..=100, lower = more interactive), which
 *   classifies sleep-heavy tasks as interactive
 * - a smoothed CPU usage percentage, used only for reporting
 *
 * Run and sleep time are fixed point: one tick is worth `tick_increment`
 * (1 << TICK_SHIFT by default). All arithmetic here runs with interrupts off,
 * so nothing may panic: divisors are floored at one, timestamps are
 * subtracted with wrapping arithmetic, and accumulators saturate.
 */

use super::{
    config::{INTERACT_HALF, INTERACT_MAX, Tunables},
    task::SchedEntity,
};

/// Coarse classification derived from the interactivity score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactivity {
    Interactive,
    Batch,
}

/// Per-task accounting report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    /// Run time in ticks
    pub run_ticks: u32,
    /// Sleep time in ticks
    pub sleep_ticks: u32,
    pub score: u32,
    pub cpu_percent: u32,
    pub class: Interactivity,
}

/// Accounting operations
///
/// Accounting is a Zero-Sized Type that groups the operations on a task's
/// history. Every operation takes the tunables explicitly.
pub struct Accounting;

impl Accounting {
    /// Task is going to sleep at `now`
    pub fn record_sleep(se: &mut SchedEntity, now: u64) {
        se.sleep_started_at = Some(now);
    }

    /// Task woke at `now`: credit the time it slept
    pub fn record_wake(se: &mut SchedEntity, now: u64, t: &Tunables) {
        if let Some(started) = se.sleep_started_at.take() {
            let slept = now.wrapping_sub(started);
            let credit = slept
                .saturating_mul(u64::from(t.tick_increment))
                .min(u64::from(u32::MAX)) as u32;
            se.sleep_time = se.sleep_time.saturating_add(credit);
        }
        Self::decay(se, t);
    }

    /// Charge one tick of run time
    pub fn record_tick(se: &mut SchedEntity, t: &Tunables) {
        se.run_time = se.run_time.saturating_add(t.tick_increment);
        Self::decay(se, t);
    }

    /// Bound run + sleep history to the decay window
    ///
    /// Any input converges under the window within two calls.
    pub fn decay(se: &mut SchedEntity, t: &Tunables) {
        let window = t.decay_window;
        let sum = se.run_time.saturating_add(se.sleep_time);
        if sum < window {
            return;
        }

        // A large one-shot credit (long sleep, inherited history): keep only
        // which side dominates.
        if sum > window.saturating_mul(2) {
            if se.run_time > se.sleep_time {
                se.run_time = window;
                se.sleep_time = 1;
            } else {
                se.sleep_time = window;
                se.run_time = 1;
            }
            return;
        }

        // Scaling by 4/5 would leave us above the window.
        if sum > (window / 5) * 6 {
            se.run_time /= 2;
            se.sleep_time /= 2;
            return;
        }

        se.run_time = (se.run_time / 5) * 4;
        se.sleep_time = (se.sleep_time / 5) * 4;
    }

    /// Interactivity score in `0..=INTERACT_MAX`; lower is more interactive
    pub fn interactivity_score(se: &SchedEntity, t: &Tunables) -> u32 {
        let run = se.run_time;
        let sleep = se.sleep_time;

        // Not worth dividing if the task cannot qualify anyway.
        if t.interactivity_threshold <= INTERACT_HALF && run >= sleep {
            return INTERACT_HALF;
        }

        let half = i64::from(INTERACT_HALF);
        let score = if run > sleep {
            let div = (run / INTERACT_HALF).max(1);
            half + (half - i64::from(sleep / div))
        } else if sleep > run {
            let div = (sleep / INTERACT_HALF).max(1);
            i64::from(run / div)
        } else if run != 0 {
            half
        } else {
            0
        };

        score.clamp(0, i64::from(INTERACT_MAX)) as u32
    }

    /// Update the CPU usage estimator at `now`
    ///
    /// If the task has been off the books for a whole window the history is
    /// dropped. If the history grew past the maximum window it is rescaled
    /// to the part still inside the window rather than reset.
    pub fn update_cpu_usage(se: &mut SchedEntity, now: u64, running: bool, t: &Tunables) {
        let window = t.cpu_window();

        if now.wrapping_sub(se.last_tick_time) >= window {
            se.cpu_ticks = 0;
            se.first_tick_time = now.wrapping_sub(window);
        } else if now.wrapping_sub(se.first_tick_time) >= t.cpu_window_max() {
            let covered = se.last_tick_time.wrapping_sub(se.first_tick_time).max(1);
            let kept = se.last_tick_time.wrapping_sub(now.wrapping_sub(window));
            se.cpu_ticks = (se.cpu_ticks / covered).saturating_mul(kept);
            se.first_tick_time = now.wrapping_sub(window);
        }

        if running {
            let ran = now.wrapping_sub(se.last_tick_time);
            se.cpu_ticks = se
                .cpu_ticks
                .saturating_add(ran.saturating_mul(u64::from(t.tick_increment)));
        }
        se.last_tick_time = now;
    }

    /// Share of the covered window the task spent running, in percent
    pub fn cpu_percent(se: &SchedEntity, t: &Tunables) -> u32 {
        let covered = se.last_tick_time.wrapping_sub(se.first_tick_time).max(1);
        let ran = se.cpu_ticks / u64::from(t.tick_increment.max(1));
        (ran.saturating_mul(100) / covered).min(100) as u32
    }

    /// Seed a forked child's history from its parent
    ///
    /// The child starts with the parent's run/sleep ratio, scaled down to the
    /// fork history limit. The parent is charged one tick for the fork.
    pub fn inherit_history(child: &mut SchedEntity, parent: &mut SchedEntity, t: &Tunables) {
        let limit = t.fork_history();
        let sum = parent.run_time.saturating_add(parent.sleep_time);

        child.run_time = parent.run_time;
        child.sleep_time = parent.sleep_time;
        if sum > limit {
            let ratio = (sum / limit.max(1)).max(1);
            child.run_time /= ratio;
            child.sleep_time /= ratio;
        }

        Self::record_tick(parent, t);
    }

    pub fn snapshot(se: &SchedEntity, t: &Tunables) -> TaskStats {
        let score = Self::interactivity_score(se, t);
        let increment = t.tick_increment.max(1);
        TaskStats {
            run_ticks: se.run_time / increment,
            sleep_ticks: se.sleep_time / increment,
            score,
            cpu_percent: Self::cpu_percent(se, t),
            class: if score < t.interactivity_threshold {
                Interactivity::Interactive
            } else {
                Interactivity::Batch
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::Priority;

    fn entity(run: u32, sleep: u32) -> SchedEntity {
        let mut se = SchedEntity::new(Priority::NORMAL, 0);
        se.run_time = run;
        se.sleep_time = sleep;
        se
    }

    #[test]
    fn test_decay_below_window_is_noop() {
        let t = Tunables::default();
        let mut se = entity(100, 200);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (100, 200));
    }

    #[test]
    fn test_decay_collapses_huge_sums() {
        let t = Tunables::default().with_decay_window(1000);

        let mut se = entity(5000, 10);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (1000, 1));

        let mut se = entity(10, 5000);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (1, 1000));

        let mut se = entity(1500, 1500);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (1, 1000));
    }

    #[test]
    fn test_decay_halves_then_scales() {
        let t = Tunables::default().with_decay_window(1000);

        let mut se = entity(900, 500);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (450, 250));

        let mut se = entity(600, 500);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (480, 400));

        // Exactly at the window still decays.
        let mut se = entity(500, 500);
        Accounting::decay(&mut se, &t);
        assert_eq!((se.run_time, se.sleep_time), (400, 400));
    }

    #[test]
    fn test_score_short_circuits_for_cpu_hogs() {
        let t = Tunables::default();
        assert_eq!(Accounting::interactivity_score(&entity(1000, 10), &t), INTERACT_HALF);
        assert_eq!(Accounting::interactivity_score(&entity(0, 0), &t), INTERACT_HALF);
    }

    #[test]
    fn test_score_branches() {
        let t = Tunables::default().with_interactivity_threshold(80);

        // Sleep-heavy tasks score low.
        assert_eq!(Accounting::interactivity_score(&entity(100, 10_000), &t), 0);
        assert_eq!(Accounting::interactivity_score(&entity(1000, 2000), &t), 25);
        // Run-heavy tasks score high.
        assert_eq!(Accounting::interactivity_score(&entity(10_000, 100), &t), 100);
        assert_eq!(Accounting::interactivity_score(&entity(2000, 1000), &t), 75);
        // Small values keep the asymmetric form but stay in range.
        assert_eq!(Accounting::interactivity_score(&entity(60, 59), &t), 41);
        assert_eq!(Accounting::interactivity_score(&entity(700, 700), &t), INTERACT_HALF);
        assert_eq!(Accounting::interactivity_score(&entity(0, 0), &t), 0);
    }

    #[test]
    fn test_wake_credits_sleep_with_wraparound() {
        let t = Tunables::default();
        let mut se = entity(0, 0);
        Accounting::record_sleep(&mut se, u64::MAX - 1);
        Accounting::record_wake(&mut se, 3, &t);
        assert_eq!(se.sleep_time, 5 * t.tick_increment);
        assert_eq!(se.sleep_started_at, None);

        // A wake without a recorded sleep credits nothing.
        Accounting::record_wake(&mut se, 100, &t);
        assert_eq!(se.sleep_time, 5 * t.tick_increment);
    }

    #[test]
    fn test_tick_charges_run_time() {
        let t = Tunables::default();
        let mut se = entity(0, 0);
        for _ in 0..3 {
            Accounting::record_tick(&mut se, &t);
        }
        assert_eq!(se.run_time, 3 * t.tick_increment);
    }

    #[test]
    fn test_cpu_usage_tracks_running_share() {
        let t = Tunables::default();
        let mut se = SchedEntity::new(Priority::NORMAL, 0);

        for now in 1..=100 {
            Accounting::update_cpu_usage(&mut se, now, true, &t);
        }
        assert_eq!(Accounting::cpu_percent(&se, &t), 100);

        Accounting::update_cpu_usage(&mut se, 200, false, &t);
        assert_eq!(Accounting::cpu_percent(&se, &t), 50);
    }

    #[test]
    fn test_cpu_usage_resets_after_long_idle() {
        let t = Tunables::default();
        let mut se = SchedEntity::new(Priority::NORMAL, 0);
        Accounting::update_cpu_usage(&mut se, 50, true, &t);

        Accounting::update_cpu_usage(&mut se, 50 + t.cpu_window(), false, &t);
        assert_eq!(se.cpu_ticks, 0);
        assert_eq!(se.first_tick_time, 50);
        assert_eq!(Accounting::cpu_percent(&se, &t), 0);
    }

    #[test]
    fn test_cpu_usage_rescales_long_history() {
        let t = Tunables::default();
        let mut se = SchedEntity::new(Priority::NORMAL, 0);
        for now in 1..=t.cpu_window_max() {
            Accounting::update_cpu_usage(&mut se, now, true, &t);
        }

        assert_eq!(se.first_tick_time, t.cpu_window_max() - t.cpu_window());
        assert!(se.cpu_ticks > 0);
        assert!(Accounting::cpu_percent(&se, &t) >= 99);
    }

    #[test]
    fn test_fork_scales_inherited_history() {
        let t = Tunables::default();
        let mut parent = entity(40 * t.tick_increment, 160 * t.tick_increment);
        let mut child = SchedEntity::new(Priority::NORMAL, 0);

        Accounting::inherit_history(&mut child, &mut parent, &t);

        assert!(child.run_time + child.sleep_time <= t.fork_history());
        assert!(child.sleep_time > child.run_time);
        assert_eq!(parent.run_time, 41 * t.tick_increment);
    }

    #[test]
    fn test_snapshot_classifies() {
        let t = Tunables::default();
        let sleeper = entity(2 * t.tick_increment, 200 * t.tick_increment);
        let stats = Accounting::snapshot(&sleeper, &t);
        assert_eq!(stats.run_ticks, 2);
        assert_eq!(stats.sleep_ticks, 200);
        assert_eq!(stats.class, Interactivity::Interactive);

        let hog = entity(200 * t.tick_increment, 0);
        assert_eq!(Accounting::snapshot(&hog, &t).class, Interactivity::Batch);
    }
}
