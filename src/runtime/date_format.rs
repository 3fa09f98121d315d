//! Source date patterns and the canonical target date form.
//!
//! Import configurations describe source dates with letter patterns such as
//! `MM/dd/yyyy` or `dd-MMM-yy HH:mm`. A pattern is compiled once into a
//! `chrono` format string; parsed values are re-emitted as `yyyy-MM-dd`.

use std::sync::OnceLock;

use chrono::format::{self, Parsed, StrftimeItems};
use chrono::NaiveDate;
use regex::Regex;

/// Target representation of every resolved date.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateFormatError {
    #[error("unsupported pattern letter '{0}'")]
    UnsupportedToken(String),

    #[error("unterminated quoted literal")]
    UnterminatedLiteral,

    #[error("'{value}' does not match the date format '{pattern}': {reason}")]
    Unparseable {
        value: String,
        pattern: String,
        reason: String,
    },
}

fn token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        Regex::new(r"'[^']*'|y+|M+|d+|H+|h+|m+|s+|S+|a+|E+|[A-Za-z]|'")
            .expect("date token pattern is valid")
    })
}

/// A compiled source date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    strftime: String,
}

impl DateFormat {
    /// Compile a letter pattern such as `MM/dd/yyyy`.
    pub fn compile(pattern: &str) -> Result<Self, DateFormatError> {
        let mut strftime = String::with_capacity(pattern.len() * 2);
        let mut last = 0;

        for token in token_regex().find_iter(pattern) {
            push_literal(&mut strftime, &pattern[last..token.start()]);
            last = token.end();

            let text = token.as_str();
            if let Some(quoted) = text.strip_prefix('\'') {
                match quoted.strip_suffix('\'') {
                    Some("") => strftime.push('\''),
                    Some(literal) => push_literal(&mut strftime, literal),
                    None => return Err(DateFormatError::UnterminatedLiteral),
                }
                continue;
            }

            strftime.push_str(translate(text)?);
        }
        push_literal(&mut strftime, &pattern[last..]);

        Ok(Self {
            pattern: pattern.to_string(),
            strftime,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The equivalent `chrono` format string.
    pub fn strftime(&self) -> &str {
        &self.strftime
    }

    /// Parse a cell value. Time-of-day fields are accepted and discarded.
    pub fn parse(&self, value: &str) -> Result<NaiveDate, DateFormatError> {
        let unparseable = |reason: String| DateFormatError::Unparseable {
            value: value.to_string(),
            pattern: self.pattern.clone(),
            reason,
        };

        let mut parsed = Parsed::new();
        format::parse(&mut parsed, value.trim(), StrftimeItems::new(&self.strftime))
            .map_err(|e| unparseable(e.to_string()))?;
        parsed.to_naive_date().map_err(|e| unparseable(e.to_string()))
    }

    /// Parse a cell value and render it in [`CANONICAL_DATE_FORMAT`].
    pub fn to_canonical(&self, value: &str) -> Result<String, DateFormatError> {
        Ok(self.parse(value)?.format(CANONICAL_DATE_FORMAT).to_string())
    }
}

fn translate(token: &str) -> Result<&'static str, DateFormatError> {
    let len = token.len();
    let specifier = match token.as_bytes()[0] {
        b'y' if len == 2 => "%y",
        b'y' => "%Y",
        b'M' if len <= 2 => "%m",
        b'M' if len == 3 => "%b",
        b'M' => "%B",
        b'd' => "%d",
        b'H' => "%H",
        b'h' => "%I",
        b'm' => "%M",
        b's' => "%S",
        b'S' => "%f",
        b'a' => "%p",
        b'E' if len <= 3 => "%a",
        b'E' => "%A",
        _ => return Err(DateFormatError::UnsupportedToken(token.to_string())),
    };
    Ok(specifier)
}

fn push_literal(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
    }
}
