use std::fmt;

/// Counter of processed items for long-running loops.
#[derive(Debug, Clone)]
pub struct Progress {
    task: &'static str,
    total: usize,
    processed: usize,
}

impl Progress {
    pub fn new(task: &'static str, total: usize) -> Self {
        Self {
            task,
            total,
            processed: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Advance by one item. Returns `true` when the new state is worth
    /// reporting: every 5% of the total and on completion.
    pub fn advance(&mut self) -> bool {
        self.processed += 1;
        let step = (self.total / 20).max(1);
        self.processed % step == 0 || self.processed == self.total
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.processed as f64 / self.total as f64
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}/{} ({:.1}%)",
            self.task,
            self.processed,
            self.total,
            self.percentage()
        )
    }
}
