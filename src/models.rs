//! Wire types for the Graph message list and the persisted match rows

use serde::{Deserialize, Serialize};

/// One response page from the message-listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub value: Vec<MessageRecord>,
    /// Opaque continuation link; absent on the last page.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    /// Approximate total count, present only when `$count=true` was requested.
    #[serde(rename = "@odata.count")]
    pub count: Option<u64>,
}

/// One fetched message, restricted to the `$select`-ed fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<Recipient>,
    pub received_date_time: Option<String>,
    pub web_link: Option<String>,
    pub internet_message_id: Option<String>,
    pub body_preview: Option<String>,
}

impl MessageRecord {
    pub fn sender_address(&self) -> Option<String> {
        self.from
            .as_ref()
            .and_then(Recipient::address)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    #[serde(rename = "emailAddress")]
    pub email_address: Option<EmailAddress>,
}

impl Recipient {
    pub fn address(&self) -> Option<&str> {
        self.email_address
            .as_ref()
            .and_then(|email| email.address.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// A qualifying message, retained for the CSV report.
///
/// Field order here is the CSV column order; serde renames are the header
/// names, kept in the API's own spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    #[serde(rename = "internetMessageId")]
    pub internet_message_id: Option<String>,
    #[serde(rename = "from")]
    pub sender: Option<String>,
    #[serde(rename = "receivedDateTime")]
    pub received_date_time: Option<String>,
    pub subject: String,
    #[serde(rename = "webLink")]
    pub web_link: Option<String>,
}
