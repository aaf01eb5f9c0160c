//! Progress reporting and batching for long-running passes.
//!
//! Bind passes advance one [`Batches`] batch per step and return control to
//! their driver in between, so a browser host can await its event loop
//! before the next step. The codec reports through [`PassProgress`].

use std::fmt;
use std::ops::Range;

/// Percentage complete for one pass of a multi-pass job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// 1-based pass number
    pub pass: usize,
    pub pass_count: usize,
    /// 0.0..=100.0
    pub percent: f32,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}% ({}/{})", self.percent, self.pass, self.pass_count)
    }
}

/// Host-provided receiver of progress text.
pub trait ProgressSink {
    fn report(&mut self, update: &ProgressUpdate);
}

impl<F: FnMut(&ProgressUpdate)> ProgressSink for F {
    fn report(&mut self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _update: &ProgressUpdate) {}
}

/// Forwards progress to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, update: &ProgressUpdate) {
        log::info!("{}", update);
    }
}

/// Cursor over `0..total` in fixed-size batches for one pass.
///
/// An empty pass still yields a single empty batch so its 100% report is
/// not skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batches {
    pass: usize,
    pass_count: usize,
    total: usize,
    size: usize,
    next: usize,
    started: bool,
}

impl Batches {
    pub fn new(pass: usize, pass_count: usize, total: usize, size: usize) -> Self {
        Self {
            pass,
            pass_count,
            total,
            size: size.max(1),
            next: 0,
            started: false,
        }
    }

    /// Next index range to process, `None` once the pass is complete
    pub fn next_batch(&mut self) -> Option<Range<usize>> {
        if self.is_done() {
            return None;
        }
        self.started = true;
        let start = self.next;
        self.next = (start + self.size).min(self.total);
        Some(start..self.next)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.started && self.next >= self.total
    }

    /// Progress after the batches handed out so far
    pub fn update(&self) -> ProgressUpdate {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.next as f32 / self.total as f32 * 100.0
        };
        ProgressUpdate {
            pass: self.pass,
            pass_count: self.pass_count,
            percent,
        }
    }
}

/// Per-pass reporter: throttles by a fixed step and keeps output monotonic.
pub struct PassProgress<'a> {
    sink: &'a mut dyn ProgressSink,
    pass: usize,
    pass_count: usize,
    every: usize,
    last_percent: f32,
}

impl<'a> PassProgress<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, pass: usize, pass_count: usize, every: usize) -> Self {
        Self {
            sink,
            pass,
            pass_count,
            every: every.max(1),
            last_percent: 0.0,
        }
    }

    /// Report `done / total` if `done` falls on a step boundary.
    pub fn tick(&mut self, done: usize, total: usize) {
        if done % self.every == 0 {
            self.emit(done, total);
        }
    }

    /// Report `done / total` if at least one step was crossed since `previous`.
    pub fn advance(&mut self, previous: usize, done: usize, total: usize) {
        if previous / self.every != done / self.every {
            self.emit(done, total);
        }
    }

    /// Final 100% report for this pass
    pub fn finish(&mut self) {
        self.last_percent = 100.0;
        self.sink.report(&ProgressUpdate {
            pass: self.pass,
            pass_count: self.pass_count,
            percent: 100.0,
        });
    }

    fn emit(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32 * 100.0).min(100.0)
        };
        let percent = percent.max(self.last_percent);
        self.last_percent = percent;
        self.sink.report(&ProgressUpdate {
            pass: self.pass,
            pass_count: self.pass_count,
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_throttles_and_finishes() {
        let mut seen = Vec::new();
        let mut sink = |u: &ProgressUpdate| seen.push(u.to_string());
        {
            let mut progress = PassProgress::new(&mut sink, 1, 3, 100);
            for i in 0..250 {
                progress.tick(i, 250);
            }
            progress.finish();
        }
        assert_eq!(seen, vec!["0.0% (1/3)", "40.0% (1/3)", "80.0% (1/3)", "100.0% (1/3)"]);
    }

    #[test]
    fn test_advance_reports_on_crossing_only() {
        let mut count = 0;
        let mut sink = |_: &ProgressUpdate| count += 1;
        {
            let mut progress = PassProgress::new(&mut sink, 1, 2, 1000);
            progress.advance(0, 500, 4000);
            progress.advance(500, 999, 4000);
            progress.advance(999, 1500, 4000);
            progress.advance(1500, 3100, 4000);
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_batches_cover_range_once() {
        let mut batches = Batches::new(2, 3, 250, 100);
        let mut seen = Vec::new();
        let mut percents = Vec::new();
        while let Some(range) = batches.next_batch() {
            seen.extend(range);
            percents.push(batches.update().to_string());
        }
        assert_eq!(seen, (0..250).collect::<Vec<_>>());
        assert_eq!(percents, vec!["40.0% (2/3)", "80.0% (2/3)", "100.0% (2/3)"]);
        assert!(batches.is_done());
        assert_eq!(batches.next_batch(), None);
    }

    #[test]
    fn test_empty_pass_yields_one_batch() {
        let mut batches = Batches::new(1, 1, 0, 100);
        assert_eq!(batches.next_batch(), Some(0..0));
        assert_eq!(batches.update().percent, 100.0);
        assert_eq!(batches.next_batch(), None);
    }
}
