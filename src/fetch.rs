//! Paged message retrieval from the Graph messages endpoint.
//!
//! The fetcher is an iterator over pages. Continuation follows the
//! server-issued `@odata.nextLink` verbatim; only the first request is built
//! locally. A 429 puts the fetcher to sleep for the advertised Retry-After
//! and then re-issues the same request, as many times as the server asks.

use std::thread;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::StatusCode;

use crate::config::Config;
use crate::error::{redact_body, retry_after_seconds, Result, ScanError};
use crate::models::{MessagePage, MessageRecord};

/// Fields requested per message; everything the classifier and the report need.
const SELECT_FIELDS: &str =
    "id,subject,from,receivedDateTime,webLink,internetMessageId,bodyPreview";

/// One page of messages plus the server's running total, when known.
#[derive(Debug)]
pub struct PageItems {
    pub messages: Vec<MessageRecord>,
    /// Server-side estimate of messages in the window, from the first page.
    pub total_estimate: Option<u64>,
}

pub struct PageFetcher<'a> {
    http: &'a reqwest::blocking::Client,
    token: String,
    next_url: Option<String>,
    total_estimate: Option<u64>,
}

impl<'a> PageFetcher<'a> {
    pub fn new(config: &Config, http: &'a reqwest::blocking::Client, token: String) -> Result<Self> {
        let url = first_page_url(config)?;
        Ok(Self {
            http,
            token,
            next_url: Some(url),
            total_estimate: None,
        })
    }

    fn fetch_page(&mut self, url: &str) -> Result<PageItems> {
        loop {
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .header("ConsistencyLevel", "eventual")
                .header("Prefer", "outlook.body-content-type=\"text\"")
                .send()?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after_seconds(response.headers());
                tracing::warn!("throttled, retrying in {}s", wait);
                thread::sleep(Duration::from_secs(wait));
                continue;
            }

            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(ScanError::Fetch {
                    status: status.as_u16(),
                    message: redact_body(&body),
                });
            }

            let page: MessagePage = response.json()?;
            if self.total_estimate.is_none() {
                self.total_estimate = page.count;
            }
            self.next_url = page.next_link;

            return Ok(PageItems {
                messages: page.value,
                total_estimate: self.total_estimate,
            });
        }
    }
}

impl Iterator for PageFetcher<'_> {
    type Item = Result<PageItems>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next_url.take()?;
        let result = self.fetch_page(&url);
        if result.is_err() {
            // Do not resume after a failed page
            self.next_url = None;
        }
        Some(result)
    }
}

/// Build the first-page URL: date filter, newest-first ordering, page size,
/// field selection, and a total count request.
fn first_page_url(config: &Config) -> Result<String> {
    let since = Utc::now() - chrono::Duration::days(i64::from(config.days_back));
    let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut url = reqwest::Url::parse(&config.messages_url())
        .map_err(|e| ScanError::Config(format!("invalid mailbox URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("$filter", &format!("receivedDateTime ge {}", since))
        .append_pair("$orderby", "receivedDateTime desc")
        .append_pair("$top", &config.page_size.to_string())
        .append_pair("$select", SELECT_FIELDS)
        .append_pair("$count", "true");
    Ok(url.into())
}
