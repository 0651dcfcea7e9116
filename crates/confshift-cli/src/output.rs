//! Console output and run progress

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use colored::{Color, Colorize};
use confshift_core::{DiffLine, Direction, LineDiff, MigrationUnit, RunObserver};
use parking_lot::Mutex;

#[derive(Clone)]
enum Sink {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Where command output goes; clones share the destination
#[derive(Clone)]
pub struct Output {
    sink: Sink,
    ansi: bool,
}

impl Output {
    /// Colored output on standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            sink: Sink::Stdout,
            ansi: true,
        }
    }

    /// Uncolored output captured in memory
    #[must_use]
    pub fn buffer() -> Self {
        Self {
            sink: Sink::Buffer(Arc::new(Mutex::new(Vec::new()))),
            ansi: false,
        }
    }

    /// With color codes on or off
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Same output moved off standard output, which then carries only
    /// the document in stream mode; buffers are kept as they are
    #[must_use]
    pub fn off_stdout(self) -> Self {
        match self.sink {
            Sink::Stdout => Self {
                sink: Sink::Stderr,
                ..self
            },
            _ => self,
        }
    }

    /// Check whether color codes are written
    #[must_use]
    pub fn ansi(&self) -> bool {
        self.ansi
    }

    /// Captured text; empty for stdout
    #[must_use]
    pub fn contents(&self) -> String {
        match &self.sink {
            Sink::Stdout | Sink::Stderr => String::new(),
            Sink::Buffer(buffer) => String::from_utf8_lossy(&buffer.lock()).into_owned(),
        }
    }

    /// Write `text` as is
    pub fn write(&self, text: &str) {
        match &self.sink {
            // Broken pipes are ignored
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush());
            }
            Sink::Stderr => {
                let mut stderr = std::io::stderr().lock();
                let _ = stderr.write_all(text.as_bytes()).and_then(|()| stderr.flush());
            }
            Sink::Buffer(buffer) => buffer.lock().extend_from_slice(text.as_bytes()),
        }
    }

    /// Write `text` in `color`
    pub fn paint(&self, text: &str, color: Color) {
        if self.ansi {
            self.write(&text.color(color).to_string());
        } else {
            self.write(text);
        }
    }

    /// Write a `label: value` line
    pub fn field(&self, label: &str, value: &str) {
        self.paint(&format!("{label}: "), Color::White);
        self.paint(&format!("{value}\n"), Color::BrightBlue);
    }

    /// Write an error block
    pub fn error(&self, message: &str) {
        self.paint(&format!("\n>> {message}\n\n"), Color::Red);
    }

    /// Write the elapsed time footer
    pub fn elapsed(&self, elapsed: Duration) {
        self.paint(
            &format!("Completed in {:.2} seconds.\n\n", elapsed.as_secs_f64()),
            Color::BrightBlack,
        );
    }

    /// Write a unified diff
    pub fn diff(&self, diff: &LineDiff) {
        if diff.is_empty() {
            self.paint(&format!("{diff}"), Color::BrightBlack);
            return;
        }
        for line in diff.lines() {
            let color = match line {
                DiffLine::Header(_) => Color::Cyan,
                DiffLine::Context(_) => Color::White,
                DiffLine::Removed(_) => Color::Red,
                DiffLine::Added(_) => Color::Green,
            };
            self.paint(&format!("{line}\n"), color);
        }
    }
}

/// Prints per-unit progress
pub(crate) struct Progress {
    out: Output,
}

impl Progress {
    pub(crate) fn new(out: Output) -> Self {
        Self { out }
    }
}

impl RunObserver for Progress {
    fn on_discovered(&mut self, _direction: Direction, units: &[MigrationUnit]) {
        self.out
            .paint(&format!("\n{} migration(s)", units.len()), Color::Green);
        self.out.paint(" found\n\n", Color::White);
    }

    fn on_unit_started(&mut self, direction: Direction, unit: &MigrationUnit) {
        let action = match direction {
            Direction::Apply => "Migrating",
            Direction::Revert => "Rolling back",
        };
        self.out.paint(&format!("{action} {unit}... "), Color::White);
    }

    fn on_unit_finished(&mut self, _direction: Direction, _unit: &MigrationUnit, elapsed: Duration) {
        self.out
            .paint(&format!("done ({}ms)\n", elapsed.as_millis()), Color::Green);
    }

    fn on_diff(&mut self, _unit: &MigrationUnit, diff: &LineDiff) {
        self.out.write("\n");
        self.out.diff(diff);
        self.out.write("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn buffer_collects_plain_text() {
        let out = Output::buffer();
        out.field("Using environment", "default");
        out.paint("plain", Color::Red);
        assert_eq!(out.contents(), "Using environment: default\nplain");
    }

    #[test]
    fn clones_share_buffer() {
        let out = Output::buffer();
        let mut progress = Progress::new(out.clone());
        let unit = MigrationUnit::parse("2020_01_01_000000_add_db").unwrap();
        progress.on_discovered(Direction::Apply, std::slice::from_ref(&unit));
        progress.on_unit_started(Direction::Revert, &unit);
        assert_eq!(
            out.contents(),
            "\n1 migration(s) found\n\nRolling back 2020_01_01_000000_add_db... "
        );
    }

    #[test]
    fn off_stdout_moves_only_stdout() {
        let moved = Output::stdout().off_stdout();
        assert!(matches!(moved.sink, Sink::Stderr));
        assert!(moved.ansi());

        let out = Output::buffer();
        let kept = out.clone().off_stdout();
        kept.write("progress");
        assert_eq!(out.contents(), "progress");
    }

    #[test]
    fn diff_rendering() {
        let out = Output::buffer();
        out.diff(&LineDiff::compute("a: 1\n", "a: 2\n", 3));
        out.diff(&LineDiff::compute("a: 1\n", "a: 1\n", 3));
        assert_eq!(
            out.contents(),
            "--- before\n+++ after\n@@ -1,1 +1,1 @@\n-a: 1\n+a: 2\n> no changes\n"
        );
    }
}
