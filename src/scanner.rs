//! Scan loop: walks fetched pages, classifies each message, and collects the
//! qualifying ones up to the configured caps.

use std::io::Write;

use crate::classifier;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::PageItems;
use crate::models::{MatchRecord, MessageRecord};
use crate::progress::ScanProgress;

const RULE_WIDTH: usize = 90;

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub scanned: u64,
    pub matches: Vec<MatchRecord>,
    pub total_estimate: Option<u64>,
}

pub struct ScanDriver<'a> {
    config: &'a Config,
}

impl<'a> ScanDriver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Drive the scan over a stream of pages, echoing matches to stdout.
    pub fn run<I>(&self, pages: I, progress: &mut dyn ScanProgress) -> Result<ScanOutcome>
    where
        I: IntoIterator<Item = Result<PageItems>>,
    {
        let stdout = std::io::stdout();
        self.run_with_output(pages, progress, &mut stdout.lock())
    }

    /// Drive the scan over a stream of pages. Stops at the first page error,
    /// when messages run out, or when either cap is reached, whichever comes
    /// first. Matches are echoed to `out` as they are found, tab-separated,
    /// under a column header and a single rule line.
    pub fn run_with_output<I, W>(
        &self,
        pages: I,
        progress: &mut dyn ScanProgress,
        out: &mut W,
    ) -> Result<ScanOutcome>
    where
        I: IntoIterator<Item = Result<PageItems>>,
        W: Write,
    {
        writeln!(out, "email_address\treceivedDateTime\tsubject")?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

        let mut outcome = ScanOutcome::default();
        let mut begun = false;

        'pages: for page in pages {
            let page = page?;

            if !begun {
                outcome.total_estimate = page.total_estimate;
                progress.begin(page.total_estimate);
                begun = true;
            }

            for message in page.messages {
                outcome.scanned += 1;
                progress.item_scanned(outcome.scanned);

                if let Some(record) = self.inspect(&message) {
                    writeln!(
                        out,
                        "{}\t{}\t{}",
                        record.sender.as_deref().unwrap_or(""),
                        record.received_date_time.as_deref().unwrap_or(""),
                        record.subject
                    )?;
                    outcome.matches.push(record);
                }

                if self.capped(&outcome) {
                    break 'pages;
                }
            }

            if self.capped(&outcome) {
                break;
            }
        }

        progress.finish();
        Ok(outcome)
    }

    fn capped(&self, outcome: &ScanOutcome) -> bool {
        outcome.scanned >= self.config.max_scan as u64
            || outcome.matches.len() >= self.config.max_results
    }

    fn inspect(&self, message: &MessageRecord) -> Option<MatchRecord> {
        let subject = normalize_subject(message.subject.as_deref().unwrap_or(""));
        let preview = message.body_preview.as_deref().unwrap_or("");

        if !classifier::qualifies(&subject, preview) {
            return None;
        }

        Some(MatchRecord {
            id: message.id.clone().unwrap_or_default(),
            internet_message_id: message.internet_message_id.clone(),
            sender: message.sender_address(),
            received_date_time: message.received_date_time.clone(),
            subject,
            web_link: message.web_link.clone(),
        })
    }
}

/// Collapse line breaks in a subject so it stays one console/CSV line.
fn normalize_subject(subject: &str) -> String {
    subject
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string()
}
