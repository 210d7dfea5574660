//! Block-size grid.
//!
//! The nominal value always walks start→end by increment and decides how
//! many configurations run. Under `reverse` the block size actually used at
//! each position is mirrored to `end - nominal + start`, so an ascending and
//! a descending run cover the same sizes in opposite order.

use crate::config::BlockSweep;
use crate::error::SweepError;

/// One position in the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep {
    /// Drives iteration and termination.
    pub nominal_block_size: u64,
    /// Used for transfer chunking and blob naming.
    pub effective_block_size: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepPlanner {
    start: u64,
    end: u64,
    increment: u64,
    reverse: bool,
}

impl SweepPlanner {
    pub fn new(sweep: &BlockSweep) -> Result<Self, SweepError> {
        if sweep.increment_block_bytes == 0 {
            return Err(SweepError::invalid("block size increment must be greater than 0"));
        }
        if sweep.start_block_bytes == 0 {
            return Err(SweepError::invalid("start block size must be greater than 0"));
        }
        Ok(Self {
            start: sweep.start_block_bytes,
            end: sweep.end_block_bytes,
            increment: sweep.increment_block_bytes,
            reverse: sweep.reverse,
        })
    }

    /// `floor((end - start) / increment) + 1`, or 0 when `start > end`.
    pub fn step_count(&self) -> u64 {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start) / self.increment + 1
        }
    }

    /// Reverse mapping of a value in `[start, end]`. Applying it twice gives
    /// the value back. `None` outside the range.
    pub fn mirror(&self, value: u64) -> Option<u64> {
        (self.start..=self.end)
            .contains(&value)
            .then(|| self.end - value + self.start)
    }

    fn step_at(&self, nominal: u64) -> SweepStep {
        // Iteration never yields a nominal value outside [start, end].
        let effective = match self.mirror(nominal) {
            Some(mirrored) if self.reverse => mirrored,
            _ => nominal,
        };
        SweepStep {
            nominal_block_size: nominal,
            effective_block_size: effective,
        }
    }

    /// Lazy pass over the grid. Consumes the planner.
    pub fn steps(self) -> SweepSteps {
        let next = (self.start <= self.end).then_some(self.start);
        SweepSteps {
            remaining: self.step_count(),
            planner: self,
            next,
        }
    }
}

impl IntoIterator for SweepPlanner {
    type Item = SweepStep;
    type IntoIter = SweepSteps;

    fn into_iter(self) -> Self::IntoIter {
        self.steps()
    }
}

#[derive(Debug)]
pub struct SweepSteps {
    planner: SweepPlanner,
    next: Option<u64>,
    remaining: u64,
}

impl Iterator for SweepSteps {
    type Item = SweepStep;

    fn next(&mut self) -> Option<SweepStep> {
        let nominal = self.next?;
        if nominal > self.planner.end {
            self.next = None;
            return None;
        }
        // Stops cleanly instead of wrapping when `end` sits near u64::MAX.
        self.next = nominal.checked_add(self.planner.increment);
        self.remaining = self.remaining.saturating_sub(1);
        Some(self.planner.step_at(nominal))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, usize::try_from(self.remaining).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn planner(start: u64, end: u64, increment: u64, reverse: bool) -> SweepPlanner {
        SweepPlanner::new(&BlockSweep {
            start_block_bytes: start,
            end_block_bytes: end,
            increment_block_bytes: increment,
            reverse,
        })
        .unwrap()
    }

    #[test]
    fn test_cardinality() {
        for (start, end, inc) in [(1, 1, 1), (1, 10, 3), (2, 32, 1), (5, 100, 7), (MIB, 3 * MIB, MIB)] {
            let p = planner(start, end, inc, false);
            let expected = (end - start) / inc + 1;
            assert_eq!(p.step_count(), expected);
            assert_eq!(p.steps().count() as u64, expected);
        }
    }

    #[test]
    fn test_start_after_end_is_empty() {
        let p = planner(10, 5, 1, false);
        assert_eq!(p.step_count(), 0);
        assert_eq!(p.steps().next(), None);
    }

    #[test]
    fn test_zero_increment_fails_fast() {
        let err = SweepPlanner::new(&BlockSweep {
            start_block_bytes: 1,
            end_block_bytes: 10,
            increment_block_bytes: 0,
            reverse: false,
        })
        .unwrap_err();
        assert!(matches!(err, SweepError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_forward_effective_equals_nominal() {
        let sizes: Vec<u64> = planner(MIB, 3 * MIB, MIB, false)
            .steps()
            .map(|s| {
                assert_eq!(s.nominal_block_size, s.effective_block_size);
                s.effective_block_size
            })
            .collect();
        assert_eq!(sizes, vec![MIB, 2 * MIB, 3 * MIB]);
    }

    #[test]
    fn test_reverse_keeps_nominal_order_and_mirrors_effective() {
        let steps: Vec<SweepStep> = planner(MIB, 3 * MIB, MIB, true).steps().collect();
        let nominal: Vec<u64> = steps.iter().map(|s| s.nominal_block_size).collect();
        let effective: Vec<u64> = steps.iter().map(|s| s.effective_block_size).collect();
        assert_eq!(nominal, vec![MIB, 2 * MIB, 3 * MIB]);
        assert_eq!(effective, vec![3 * MIB, 2 * MIB, MIB]);
    }

    #[test]
    fn test_reverse_covers_same_sizes() {
        // When `end` is off the grid the mirrored sizes shift but stay in range.
        for (start, end, inc) in [(1, 10, 3), (1, 11, 3), (2, 32, 1), (4, 4, 1), (MIB, 8 * MIB, MIB)] {
            let mut forward: Vec<u64> = planner(start, end, inc, false)
                .steps()
                .map(|s| s.effective_block_size)
                .collect();
            let mut reversed: Vec<u64> = planner(start, end, inc, true)
                .steps()
                .map(|s| s.effective_block_size)
                .collect();
            assert_eq!(forward.len(), reversed.len());
            assert!(reversed.iter().all(|v| (start..=end).contains(v)));
            if (end - start) % inc == 0 {
                forward.sort_unstable();
                reversed.sort_unstable();
                assert_eq!(forward, reversed);
            }
        }
    }

    #[test]
    fn test_mirror_is_involution() {
        let p = planner(2, 32, 1, true);
        for step in p.steps() {
            assert_eq!(p.mirror(step.effective_block_size), Some(step.nominal_block_size));
        }
    }

    #[test]
    fn test_mirror_outside_range() {
        let p = planner(2, 32, 1, true);
        assert_eq!(p.mirror(1), None);
        assert_eq!(p.mirror(33), None);
        assert_eq!(p.mirror(2), Some(32));
    }

    #[test]
    fn test_zero_start_rejected() {
        let err = SweepPlanner::new(&BlockSweep {
            start_block_bytes: 0,
            end_block_bytes: u64::MAX,
            increment_block_bytes: 1,
            reverse: false,
        })
        .unwrap_err();
        assert!(matches!(err, SweepError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_full_range_step_count() {
        assert_eq!(planner(1, u64::MAX, 1, false).step_count(), u64::MAX);
    }

    #[test]
    fn test_no_overflow_near_max() {
        let p = planner(u64::MAX - 2, u64::MAX, 2, false);
        let steps: Vec<u64> = p.steps().map(|s| s.nominal_block_size).collect();
        assert_eq!(steps, vec![u64::MAX - 2, u64::MAX]);
    }

    #[test]
    fn test_size_hint_is_exact() {
        let mut steps = planner(1, 10, 3, false).steps();
        assert_eq!(steps.size_hint(), (4, Some(4)));
        steps.next();
        assert_eq!(steps.size_hint(), (3, Some(3)));
    }
}
