// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Render the textual progress frames consumers script against.
// Author: Lukas Bower

//! Progress frame rendering.
//!
//! The output format is a protocol: `"{pct:3}% [{bar:36}]"` lines as the
//! percentage changes, then `Success!` on clean completion. Scripts parse
//! these lines verbatim, so the layout is fixed. The reporter is an
//! explicit object passed into the apply run rather than ambient state,
//! so tests capture output without touching stdout.

use std::io::{self, Write};

/// Width of the progress bar in characters.
pub const BAR_WIDTH: usize = 36;

/// Renders progress frames into any writer.
#[derive(Debug)]
pub struct ProgressReporter<W: Write> {
    sink: W,
    last_percent: Option<u8>,
}

impl<W: Write> ProgressReporter<W> {
    /// Create a reporter for one apply run.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            last_percent: None,
        }
    }

    /// Report cumulative progress; emits a frame only when the integer
    /// percentage changes. Never decreases within a run.
    pub fn report(&mut self, bytes_written: u64, bytes_total: u64) -> io::Result<()> {
        let percent = if bytes_total == 0 {
            100
        } else {
            (bytes_written.saturating_mul(100) / bytes_total).min(100) as u8
        };
        if self.last_percent == Some(percent) {
            return Ok(());
        }
        self.last_percent = Some(percent);

        let filled = usize::from(percent) * BAR_WIDTH / 100;
        let mut bar = String::with_capacity(BAR_WIDTH);
        for _ in 0..filled {
            bar.push('=');
        }
        for _ in filled..BAR_WIDTH {
            bar.push(' ');
        }
        writeln!(self.sink, "{percent:3}% [{bar}]")
    }

    /// Emit the final success line.
    pub fn success(&mut self) -> io::Result<()> {
        writeln!(self.sink, "Success!")?;
        self.sink.flush()
    }

    /// Consume the reporter, returning the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(reporter: ProgressReporter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(reporter.into_inner())
            .expect("utf-8 output")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn frames_are_fixed_width() {
        let mut reporter = ProgressReporter::new(Vec::new());
        reporter.report(0, 4096).expect("report");
        reporter.report(1024, 4096).expect("report");
        let output = lines(reporter);
        assert_eq!(output[0], format!("  0% [{}]", " ".repeat(36)));
        assert_eq!(output[1], format!(" 25% [{}{}]", "=".repeat(9), " ".repeat(27)));
    }

    #[test]
    fn unchanged_percent_emits_nothing() {
        let mut reporter = ProgressReporter::new(Vec::new());
        reporter.report(0, 1_000_000).expect("report");
        reporter.report(1, 1_000_000).expect("report");
        reporter.report(2, 1_000_000).expect("report");
        assert_eq!(lines(reporter).len(), 1);
    }

    #[test]
    fn completion_fills_the_bar() {
        let mut reporter = ProgressReporter::new(Vec::new());
        reporter.report(4096, 4096).expect("report");
        reporter.success().expect("success");
        let output = lines(reporter);
        assert_eq!(output[0], format!("100% [{}]", "=".repeat(36)));
        assert_eq!(output[1], "Success!");
    }

    #[test]
    fn zero_total_reports_complete() {
        let mut reporter = ProgressReporter::new(Vec::new());
        reporter.report(0, 0).expect("report");
        assert_eq!(lines(reporter)[0], format!("100% [{}]", "=".repeat(36)));
    }
}
