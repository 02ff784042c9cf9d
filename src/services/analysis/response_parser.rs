//! Best-effort reader for the model's reply.
//!
//! The reply is split into lines and each line is classified into one of a
//! few token kinds. Blocks are then formed from heading tokens, and every
//! output field is looked up independently: a missing heading, a broken JSON
//! line or an empty list only empties that one field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::template::{is_recommendations_title, SectionName, METRIC_KEYS, STATS_MARKER};
use crate::models::{AnalysisResult, KeyMetrics, Metric, Sections};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Line carrying the stats marker; `payload` is everything after it.
    Marker { payload: &'a str },
    /// `**TITLE**` or `## TITLE`; `trailing` is text after the closing `**`.
    Heading { title: &'a str, trailing: &'a str },
    /// `N. text`; `text` is everything after the period.
    NumberedItem { text: &'a str },
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub raw: &'a str,
    pub token: Token<'a>,
}

#[derive(Debug)]
struct Block<'a> {
    title: &'a str,
    trailing: &'a str,
    lines: Vec<Line<'a>>,
}

impl Block<'_> {
    fn body(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.lines.len() + 1);
        if !self.trailing.is_empty() {
            parts.push(self.trailing);
        }
        parts.extend(self.lines.iter().map(|l| l.raw));
        parts.join("\n").trim().to_string()
    }
}

pub fn classify_line(raw: &str) -> Token<'_> {
    if let Some(idx) = raw.find(STATS_MARKER) {
        return Token::Marker {
            payload: &raw[idx + STATS_MARKER.len()..],
        };
    }
    if let Some((title, trailing)) = heading(raw) {
        return Token::Heading { title, trailing };
    }
    if let Some(text) = numbered_item(raw) {
        return Token::NumberedItem { text };
    }
    Token::Text
}

pub fn tokenize(text: &str) -> Vec<Line<'_>> {
    text.split('\n')
        .map(|raw| raw.strip_suffix('\r').unwrap_or(raw))
        .map(|raw| Line {
            raw,
            token: classify_line(raw),
        })
        .collect()
}

fn heading(raw: &str) -> Option<(&str, &str)> {
    let trimmed = raw.trim();

    let (title, trailing) = if let Some(rest) = trimmed.strip_prefix("**") {
        let close = rest.find("**")?;
        (&rest[..close], &rest[close + 2..])
    } else if trimmed.starts_with('#') {
        let rest = trimmed.trim_start_matches('#').trim();
        let rest = rest.strip_prefix("**").unwrap_or(rest);
        (rest.strip_suffix("**").unwrap_or(rest), "")
    } else {
        return None;
    };

    let title = title.trim().trim_end_matches(':').trim_end();
    let trailing = trailing.trim_start_matches(':').trim();
    if is_heading_title(title) {
        Some((title, trailing))
    } else {
        None
    }
}

/// A known heading in any case, or any ALL-CAPS title starting with a letter.
fn is_heading_title(title: &str) -> bool {
    if SectionName::from_title(title).is_some() || is_recommendations_title(title) {
        return true;
    }
    title.chars().next().map_or(false, char::is_alphabetic)
        && !title.chars().any(char::is_lowercase)
}

fn numbered_item(raw: &str) -> Option<&str> {
    let trimmed = raw.trim_start();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == trimmed.len() {
        return None;
    }
    rest.strip_prefix('.')
}

static STAR_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static UNDERSCORE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w])_{1,2}([^_\n]+?)_{1,2}([^\w]|$)").unwrap());

/// Drops bold and italic markers (`**x**`, `*x*`, `__x__`, `_x_`) and a
/// stray leading bullet star. Underscores inside words are left alone.
fn clean_recommendation(text: &str) -> String {
    let text = text.replace("**", "");
    let text = STAR_EMPHASIS.replace_all(&text, "$1");
    let text = UNDERSCORE_EMPHASIS.replace_all(&text, "$1$2$3");
    text.trim().trim_start_matches('*').trim().to_string()
}

/// Parses the metrics object from a marker payload. Anything short of a JSON
/// object yields `None`.
pub fn parse_stats(payload: &str) -> Option<KeyMetrics> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: Map<String, Value> = serde_json::from_str(&payload[start..=end]).ok()?;

    let [revenue, top_product, growth, risk] = METRIC_KEYS.map(|(label, value)| metric(&raw, label, value));
    Some(KeyMetrics {
        revenue,
        top_product,
        growth,
        risk,
    })
}

fn metric(raw: &Map<String, Value>, label_key: &str, value_key: &str) -> Option<Metric> {
    let label = raw.get(label_key).and_then(scalar_text).filter(|l| !l.is_empty())?;
    let value = raw.get(value_key).and_then(scalar_text).unwrap_or_default();
    Some(Metric { label, value })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn into_blocks<'a>(lines: &[Line<'a>]) -> Vec<Block<'a>> {
    let mut blocks: Vec<Block<'a>> = Vec::new();
    for line in lines {
        match line.token {
            Token::Heading { title, trailing } => blocks.push(Block {
                title,
                trailing,
                lines: Vec::new(),
            }),
            // text before the first heading belongs to no block
            _ => {
                if let Some(block) = blocks.last_mut() {
                    block.lines.push(*line);
                }
            }
        }
    }
    blocks
}

/// Turns raw model output into an [`AnalysisResult`]. Never fails.
///
/// `raw_text` is the input with the first marker line cut out and outer
/// whitespace trimmed; line endings are kept as received.
pub fn parse_response(text: &str) -> AnalysisResult {
    let mut lines = tokenize(text);

    let marker_at = lines
        .iter()
        .position(|l| matches!(l.token, Token::Marker { .. }));
    let stats = marker_at.and_then(|idx| match lines.remove(idx).token {
        Token::Marker { payload } => parse_stats(payload),
        _ => None,
    });
    if marker_at.is_some() && stats.is_none() {
        tracing::warn!("Stats line present but could not be parsed");
    }

    // same line indices as `tokenize`, but with the terminators kept
    let raw_text = match marker_at {
        Some(idx) => text
            .split_inclusive('\n')
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, line)| line)
            .collect::<String>(),
        None => text.to_string(),
    };
    let raw_text = raw_text.trim().to_string();

    let blocks = into_blocks(&lines);

    let recommendations: Vec<String> = blocks
        .iter()
        .find(|b| is_recommendations_title(b.title))
        .map(|block| {
            block
                .lines
                .iter()
                .filter_map(|l| match l.token {
                    Token::NumberedItem { text } => Some(clean_recommendation(text)),
                    _ => None,
                })
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut sections = Sections::default();
    for name in SectionName::ALL {
        let body = blocks
            .iter()
            .find(|b| SectionName::from_title(b.title) == Some(name))
            .map(Block::body)
            .filter(|body| !body.is_empty());
        if let Some(body) = body {
            sections.set(name, body);
        }
    }

    tracing::debug!(
        "Parsed response: stats={}, recommendations={}, sections={}",
        stats.is_some(),
        recommendations.len(),
        SectionName::ALL.iter().filter(|n| sections.get(**n).is_some()).count()
    );

    AnalysisResult {
        stats,
        recommendations,
        sections,
        raw_text,
    }
}
