//! Scan progress reporting: a live bar on a terminal, periodic lines otherwise.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Emit a plain progress line after this many messages.
const REPORT_EVERY: u64 = 200;

pub trait ScanProgress {
    /// Called once before the first message, with the server's total
    /// estimate when one is available.
    fn begin(&mut self, total_estimate: Option<u64>);

    /// Called after each scanned message with the running count.
    fn item_scanned(&mut self, scanned: u64);

    fn finish(&mut self);
}

/// Pick a reporter for the current environment: a live indicatif display
/// when stderr is a terminal, periodic `[SCAN]` lines when it is not.
pub fn for_environment() -> Box<dyn ScanProgress> {
    if std::io::stderr().is_terminal() {
        Box::new(RichProgress::default())
    } else {
        Box::new(PlainProgress::default())
    }
}

/// Interactive display: a bar when the total is known, a spinner otherwise.
#[derive(Default)]
pub struct RichProgress {
    bar: Option<ProgressBar>,
}

impl ScanProgress for RichProgress {
    fn begin(&mut self, total_estimate: Option<u64>) {
        let bar = match total_estimate {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("[{elapsed:>6}] {spinner} {pos} scanned {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message("scanning");
        self.bar = Some(bar);
    }

    fn item_scanned(&mut self, scanned: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(scanned);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Non-interactive fallback: one `[SCAN]` line every `REPORT_EVERY` messages.
#[derive(Default)]
pub struct PlainProgress {
    total_estimate: Option<u64>,
}

impl ScanProgress for PlainProgress {
    fn begin(&mut self, total_estimate: Option<u64>) {
        self.total_estimate = total_estimate;
    }

    fn item_scanned(&mut self, scanned: u64) {
        if scanned % REPORT_EVERY != 0 {
            return;
        }
        match self.total_estimate {
            Some(total) if total > 0 => {
                let pct = scanned as f64 * 100.0 / total as f64;
                println!("[SCAN] {}/{} ({:.1}%)", scanned, total, pct);
            }
            _ => println!("[SCAN] {} scanned...", scanned),
        }
    }

    fn finish(&mut self) {}
}
