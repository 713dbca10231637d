//! Ramp-up schedule for spawning workers in batches

/// Batch plan for reaching the target concurrency
///
/// Workers are started `batch` at a time over `ceil(concurrency / batch)`
/// batches. Before each spawn the number of workers already started is
/// compared against the target with `>`, so a batch grid with a slot past
/// the target starts one worker more than asked for: the total is
/// `min(batches * batch, concurrency + 1)`. Without ramping (one batch of
/// exactly `concurrency` slots) there is no spare slot and the pool matches
/// the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSchedule {
    concurrency: usize,
    batch: usize,
}

impl RampSchedule {
    /// Schedule for `concurrency` workers, `ramp_up` per batch (0 = all at once)
    pub fn new(concurrency: usize, ramp_up: usize) -> Self {
        let batch = if ramp_up == 0 { concurrency } else { ramp_up };
        Self {
            concurrency,
            batch: batch.max(1),
        }
    }

    /// Number of batches
    pub fn batches(&self) -> usize {
        self.concurrency.div_ceil(self.batch)
    }

    /// Spawn slots per batch
    pub fn batch_size(&self) -> usize {
        self.batch
    }

    /// Whether batches are separated by a pause
    pub fn is_ramping(&self) -> bool {
        self.batch != self.concurrency
    }

    /// Whether another worker may start after `spawned` have started
    pub fn admits(&self, spawned: usize) -> bool {
        spawned <= self.concurrency
    }

    /// Total number of workers the schedule starts if never interrupted
    pub fn planned_workers(&self) -> usize {
        let mut spawned = 0;
        for _ in 0..self.batches() {
            for _ in 0..self.batch {
                if !self.admits(spawned) {
                    return spawned;
                }
                spawned += 1;
            }
        }
        spawned
    }
}
