//! Run progress ticks and the end-of-run summary.
//!
//! [`ProgressReporter`] owns the [`RunStats`] of one run and turns each
//! consumed item into a [`ProgressEvent`]. [`RunSummary`] wraps a reporter
//! and prints the summary when dropped, so a run that stops early on a fatal
//! error still reports its elapsed time and peak memory.

use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

const COARSE_TICK_EVERY: u64 = 100;
const FINE_TICK_EVERY: u64 = 10;

/// Counters and timestamps for one import run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub processed: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Label of the phase the last item was processed in, e.g. `page 3`.
    pub page: String,
    /// Feed position of the last item, skipped pages included.
    pub position: u64,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    pub categories: Vec<String>,
    pub added: Vec<String>,
}

impl RunStats {
    fn new() -> Self {
        Self {
            processed: 0,
            inserted: 0,
            skipped: 0,
            failed: 0,
            page: String::new(),
            position: 0,
            started_at: Instant::now(),
            finished_at: None,
            categories: Vec::new(),
            added: Vec::new(),
        }
    }

    /// Time since start, frozen once the run is finished.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    PhaseChanged(String),
    CoarseTick(u64),
    FineTick,
    Silent,
}

#[derive(Debug)]
pub struct ProgressReporter {
    stats: RunStats,
    phase: Option<String>,
    echo: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: RunStats::new(),
            phase: None,
            echo: true,
        }
    }

    /// Reporter that tracks stats but writes no ticks.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            echo: false,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn set_position(&mut self, position: u64) {
        self.stats.position = position;
    }

    /// Counts one item processed in `phase`.
    ///
    /// A phase change wins over a tick for the same item.
    pub fn advance(&mut self, phase: &str) -> ProgressEvent {
        self.stats.processed += 1;

        if self.phase.as_deref() != Some(phase) {
            self.phase = Some(phase.to_owned());
            phase.clone_into(&mut self.stats.page);
            return ProgressEvent::PhaseChanged(phase.to_owned());
        }

        let n = self.stats.processed;
        if n % COARSE_TICK_EVERY == 0 {
            ProgressEvent::CoarseTick(n)
        } else if n % FINE_TICK_EVERY == 0 {
            ProgressEvent::FineTick
        } else {
            ProgressEvent::Silent
        }
    }

    /// Writes `event` to stdout unless the reporter is quiet.
    pub fn emit(&self, event: &ProgressEvent) {
        if !self.echo {
            return;
        }
        let mut out = std::io::stdout().lock();
        let written = match event {
            ProgressEvent::PhaseChanged(phase) => writeln!(out, "\n{phase}"),
            ProgressEvent::CoarseTick(n) => writeln!(out, " {n}"),
            ProgressEvent::FineTick => write!(out, "."),
            ProgressEvent::Silent => return,
        };
        if written.and_then(|()| out.flush()).is_err() {
            tracing::debug!("stdout closed, dropping progress output");
        }
    }

    pub fn record_inserted(&mut self, product_id: &str, title: &str, category: &str) {
        self.stats.inserted += 1;
        self.stats.added.push(format!("{product_id} {title}"));
        if !category.is_empty() && !self.stats.categories.iter().any(|c| c == category) {
            self.stats.categories.push(category.to_owned());
        }
    }

    pub fn record_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.stats.failed += 1;
    }

    /// Freezes the elapsed time. Later calls keep the first end time.
    pub fn finish(&mut self) {
        self.stats.finished_at.get_or_insert_with(Instant::now);
    }

    /// The end-of-run report, one entry per output line.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let stats = &self.stats;
        let mut lines = Vec::new();

        push_list(&mut lines, "Categories:", &stats.categories);
        push_list(&mut lines, "Added:", &stats.added);

        lines.push(format!(
            "processed {} items: {} inserted, {} skipped, {} failed",
            stats.processed, stats.inserted, stats.skipped, stats.failed
        ));
        if stats.processed > 0 {
            lines.push(format!(
                "last item: {}, feed position {}",
                stats.page, stats.position
            ));
        }
        lines.push(format!(
            "import finished in {}",
            format_elapsed(stats.elapsed())
        ));
        lines.push(format!(
            "peak memory usage: {}",
            peak_memory_kb().map_or_else(|| "unknown".to_owned(), format_megabytes)
        ));
        lines
    }
}

fn push_list(lines: &mut Vec<String>, heading: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    lines.push(heading.to_owned());
    lines.extend(entries.iter().cloned());
}

/// Writes the run summary when dropped.
pub struct RunSummary {
    reporter: ProgressReporter,
    out: Box<dyn Write + Send>,
}

impl RunSummary {
    /// Summary guard that writes to stdout.
    #[must_use]
    pub fn new(reporter: ProgressReporter) -> Self {
        Self::with_output(reporter, std::io::stdout())
    }

    #[must_use]
    pub fn with_output(reporter: ProgressReporter, out: impl Write + Send + 'static) -> Self {
        Self {
            reporter,
            out: Box::new(out),
        }
    }
}

impl Deref for RunSummary {
    type Target = ProgressReporter;

    fn deref(&self) -> &Self::Target {
        &self.reporter
    }
}

impl DerefMut for RunSummary {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reporter
    }
}

impl Drop for RunSummary {
    fn drop(&mut self) {
        self.reporter.finish();
        let lines = self.reporter.summary_lines();
        let written = writeln!(self.out)
            .and_then(|()| lines.iter().try_for_each(|line| writeln!(self.out, "{line}")))
            .and_then(|()| self.out.flush());
        if written.is_err() {
            tracing::debug!("summary output closed, dropping run summary");
        }
    }
}

/// Clonable in-memory sink for summary output in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedOutput(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedOutput {
    pub(crate) fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[cfg(test)]
impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// `HH:MM:SS`; hours keep counting past 99.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

#[allow(clippy::cast_precision_loss)] // Display only.
fn format_megabytes(kb: u64) -> String {
    format!("{:.2}MB", kb as f64 / 1024.0)
}

/// Peak resident set size of this process, from `/proc/self/status`.
fn peak_memory_kb() -> Option<u64> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .as_deref()
        .and_then(parse_vm_hwm)
}

fn parse_vm_hwm(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        line.strip_prefix("VmHWM:")?
            .trim()
            .strip_suffix("kB")?
            .trim()
            .parse()
            .ok()
    })
}
