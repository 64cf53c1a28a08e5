// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge bot reply grammar.
//!
//! Each platform has a table of `{marker, pattern}` rules. A reply is
//! classified as the highest-precedence marker whose rule matches, so a
//! reply carrying both an error phrase and a success phrase is an error.
//! Callers then decide whether that marker is meaningful at their wait point.

use std::sync::LazyLock;

use regex::Regex;
use unichat_core::Platform;

/// What a bot reply means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Error,
    StatusDisconnected,
    AlreadyConnected,
    Success,
    StatusConnected,
    /// The bot handed out a pairing code for the user to enter on their phone.
    CodeIssued,
    /// The bot asks for a verification code the user received.
    CodeRequest,
    PhoneRequest,
    /// QR instructions without any QR data.
    QrHint,
}

/// Classification order, highest first.
pub const PRECEDENCE: [Marker; 9] = [
    Marker::Error,
    Marker::StatusDisconnected,
    Marker::AlreadyConnected,
    Marker::Success,
    Marker::StatusConnected,
    Marker::CodeIssued,
    Marker::CodeRequest,
    Marker::PhoneRequest,
    Marker::QrHint,
];

/// One grammar row. Matches when `pattern` matches and `unless` does not.
#[derive(Debug)]
pub struct ReplyRule {
    pub marker: Marker,
    pattern: Regex,
    unless: Option<Regex>,
}

impl ReplyRule {
    fn new(marker: Marker, pattern: &str) -> Self {
        Self {
            marker,
            pattern: compile(pattern),
            unless: None,
        }
    }

    fn unless(mut self, pattern: &str) -> Self {
        self.unless = Some(compile(pattern));
        self
    }

    pub fn matches(&self, body: &str) -> bool {
        self.pattern.is_match(body) && !self.unless.as_ref().is_some_and(|u| u.is_match(body))
    }
}

/// The rule table of one bridge.
#[derive(Debug)]
pub struct Grammar {
    rules: Vec<ReplyRule>,
}

impl Grammar {
    pub fn new(rules: Vec<ReplyRule>) -> Self {
        Self { rules }
    }

    /// The highest-precedence marker matching `body`.
    pub fn classify(&self, body: &str) -> Option<Marker> {
        PRECEDENCE.into_iter().find(|marker| {
            self.rules
                .iter()
                .any(|rule| rule.marker == *marker && rule.matches(body))
        })
    }

    /// Grammar for a platform's bridge bot.
    pub fn for_platform(platform: Platform) -> &'static Grammar {
        match platform {
            Platform::Whatsapp => &WHATSAPP,
            Platform::Telegram => &TELEGRAM,
            Platform::Instagram | Platform::Twitter | Platform::Matrix => &COOKIE_BRIDGE,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("grammar patterns are static and valid")
}

const ERROR: &str = r"(?i)\b(error|fail(ed|ure)?|invalid|wrong|incorrect|expired)\b";
const DISCONNECTED: &str = r"(?i)not logged in|not connected|no (active )?(logins?|sessions?)|login required|please log ?in first|logged out";
const ALREADY: &str = r"(?i)already (logged in|connected|authenticated|linked)|you('| a)re already";
const SUCCESS: &str = r"(?i)\b(success(ful|fully)?|logged in|authenticated)\b|\bconnected\b";
const CONNECTED: &str = r"(?i)logged in as|you('| a)re logged in|\bsyncing\b";

fn status_rules() -> Vec<ReplyRule> {
    vec![
        ReplyRule::new(Marker::Error, ERROR),
        ReplyRule::new(Marker::StatusDisconnected, DISCONNECTED),
        ReplyRule::new(Marker::AlreadyConnected, ALREADY),
        ReplyRule::new(Marker::Success, SUCCESS),
        ReplyRule::new(Marker::StatusConnected, CONNECTED),
    ]
}

static WHATSAPP: LazyLock<Grammar> = LazyLock::new(|| {
    let mut rules = status_rules();
    rules.extend([
        ReplyRule::new(
            Marker::CodeIssued,
            r"(?i:(pairing|verification|login) code)|^\s*\d{6}\s*$|\b[A-Z0-9]{4}-[A-Z0-9]{4}\b",
        ),
        ReplyRule::new(Marker::PhoneRequest, r"(?i)\b(phone|number)\b").unless(r"(?i)\bqr\b"),
        ReplyRule::new(Marker::QrHint, r"(?i)\b(qr|scan)\b"),
    ]);
    Grammar::new(rules)
});

static TELEGRAM: LazyLock<Grammar> = LazyLock::new(|| {
    let mut rules = status_rules();
    rules.extend([
        ReplyRule::new(Marker::CodeRequest, r"(?i)\b(code|verification)\b|sent to"),
        ReplyRule::new(Marker::PhoneRequest, r"(?i)\b(phone|number)\b|\+"),
    ]);
    Grammar::new(rules)
});

static COOKIE_BRIDGE: LazyLock<Grammar> = LazyLock::new(|| Grammar::new(status_rules()));

static WEB_LOGIN_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"https://web\.whatsapp\.com/\S+"));
static ANY_URL: LazyLock<Regex> = LazyLock::new(|| compile(r"https?://\S+"));
static QR_URL_HINT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)whatsapp|web|qr"));
static RAW_QR_PAYLOAD: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[A-Za-z0-9@,+/=._-]{20,}$"));
static PAIRING_CODE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b([A-Z0-9]{4}-[A-Z0-9]{4})\b|\b(\d{6})\b"));
static ACCOUNT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)logged in as (@?[\w.]+)"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| compile(r"\+\d{6,15}"));

/// Longest text that may carry a QR link.
const MAX_QR_LINK_MESSAGE: usize = 500;

/// Data to encode into a QR image, if the reply carries one.
pub fn extract_qr_payload(body: &str) -> Option<String> {
    if let Some(m) = WEB_LOGIN_URL.find(body) {
        return Some(m.as_str().to_string());
    }
    if body.len() < MAX_QR_LINK_MESSAGE
        && let Some(m) = ANY_URL
            .find_iter(body)
            .find(|m| QR_URL_HINT.is_match(m.as_str()))
    {
        return Some(m.as_str().to_string());
    }
    let trimmed = body.trim();
    RAW_QR_PAYLOAD
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}

/// Pairing or verification code handed out by the bot.
pub fn extract_code(body: &str) -> Option<String> {
    let captures = PAIRING_CODE.captures(body)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

/// Account name or phone number mentioned in a status reply.
pub fn extract_account(body: &str) -> Option<String> {
    if let Some(captures) = ACCOUNT.captures(body) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }
    PHONE.find(body).map(|m| m.as_str().to_string())
}
