/*
 * Time Slice Calculator
 *
 * Bounds timeshare latency by shrinking the slice as load grows. The latency
 * a queued task sees is roughly the sum of the slices of the tasks ahead of
 * it, so the slice targets `base_slice` of total latency, but never hands out
 * less than `min_slice`.
 */

use super::{config::Tunables, types::TimeSliceTicks};

pub struct SliceCalculator;

impl SliceCalculator {
    /// Slice for the task about to run on a queue carrying `system_load`
    ///
    /// The load includes the task itself, which is why one is subtracted.
    pub fn compute(system_load: usize, t: &Tunables) -> TimeSliceTicks {
        let load = system_load.saturating_sub(1);
        let divisor = t.min_slice_divisor as usize;

        let ticks = if load >= divisor {
            t.min_slice
        } else if load <= 1 {
            t.base_slice
        } else {
            (t.base_slice / load as u32).clamp(t.min_slice, t.base_slice)
        };
        TimeSliceTicks(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_contention_gets_full_slice() {
        let t = Tunables::default();
        assert_eq!(SliceCalculator::compute(0, &t), TimeSliceTicks(10));
        assert_eq!(SliceCalculator::compute(1, &t), TimeSliceTicks(10));
        assert_eq!(SliceCalculator::compute(2, &t), TimeSliceTicks(10));
    }

    #[test]
    fn test_slice_shrinks_with_load() {
        let t = Tunables::default();
        assert_eq!(SliceCalculator::compute(3, &t), TimeSliceTicks(5));
        assert_eq!(SliceCalculator::compute(4, &t), TimeSliceTicks(3));
        assert_eq!(SliceCalculator::compute(6, &t), TimeSliceTicks(2));
        assert_eq!(SliceCalculator::compute(7, &t), TimeSliceTicks(1));
        assert_eq!(SliceCalculator::compute(1000, &t), TimeSliceTicks(1));
    }

    #[test]
    fn test_floor_holds_for_custom_tunables() {
        let t = Tunables::default().with_slices(3, 2);
        for load in 0..20 {
            let slice = SliceCalculator::compute(load, &t).get();
            assert!((2..=3).contains(&slice), "load {} gave {}", load, slice);
        }
    }
}
