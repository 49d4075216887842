//! Two-part keyword classifier for payment/address-detail change fraud

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Verbs that ask for something to be changed
static ACTION_WORDS: &[&str] = &[
    "change", "modify", "switch", "update", "alter", "revise", "amend", "edit",
];

static ADDRESS_WORDS: &[&str] = &["address"];
static ADDRESS_PHRASES: &[&str] = &[
    "mailing address",
    "billing address",
    "remit to",
    "remittance address",
    "ship to",
];

static BANK_WORDS: &[&str] = &["ach"];
static BANK_PHRASES: &[&str] = &[
    "bank account",
    "bank information",
    "bank details",
    "routing information",
    "routing number",
    "account number",
    "wire instructions",
    "direct deposit",
    "payment details",
    "routing #",
    "acct #",
    "account #",
    "bank acct",
];

/// Case-insensitive alternation: single words get word boundaries, phrases
/// are matched as escaped literal substrings.
fn compile_terms(words: &[&str], phrases: &[&str]) -> Regex {
    let mut parts: Vec<String> = words
        .iter()
        .map(|word| format!(r"\b{}\b", regex::escape(word)))
        .collect();
    parts.extend(phrases.iter().map(|phrase| regex::escape(phrase)));

    RegexBuilder::new(&parts.join("|"))
        .case_insensitive(true)
        .build()
        .unwrap()
}

static ACTION_PATTERN: Lazy<Regex> = Lazy::new(|| compile_terms(ACTION_WORDS, &[]));

static TARGET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let words: Vec<&str> = [ADDRESS_WORDS, BANK_WORDS].concat();
    let phrases: Vec<&str> = [ADDRESS_PHRASES, BANK_PHRASES].concat();
    compile_terms(&words, &phrases)
});

/// Decide whether a message looks like a detail-change request.
///
/// Subject and preview are joined (subject first) and tested against both
/// matchers independently; a message qualifies only when an action term AND
/// an address/banking term are both present somewhere in the combined text.
pub fn qualifies(subject: &str, preview: &str) -> bool {
    let text = format!("{}\n{}", subject, preview);
    ACTION_PATTERN.is_match(&text) && TARGET_PATTERN.is_match(&text)
}
