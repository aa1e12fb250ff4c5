//! Functions shared by the renderer and the parser functions which do not
//! belong to any one of them.

use core::fmt::{self, Write as _};
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

/// A date parsing or formatting error.
#[derive(Debug, thiserror::Error)]
pub enum DateError {
    /// The input was not in any recognised timestamp format.
    #[error("invalid timestamp '{0}'")]
    Parse(String),
    /// The timestamp was out of the representable range.
    #[error(transparent)]
    Range(#[from] time::error::ComponentRange),
    /// An error occurred when trying to write to a string.
    #[error(transparent)]
    Write(#[from] fmt::Error),
}

/// Encodes section heading text into a slug suitable for use as an element ID
/// and URL anchor.
///
/// The text is lowercased, characters other than word characters, white
/// space, and hyphens are removed, and runs of white space become a single
/// hyphen.
pub fn anchor_encode(s: &str) -> String {
    static STRIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());
    static SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

    let s = decode_html(s.trim()).to_lowercase();
    let s = STRIP.replace_all(&s, "");
    SPACE.replace_all(s.trim(), "-").into_owned()
}

/// Normalizes a template or page name for lookup: trims it, lowercases it,
/// and collapses runs of white space and underscores into a single `_`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name
        .trim()
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|word| !word.is_empty())
    {
        if !out.is_empty() {
            out.push('_');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Decodes HTML entities.
#[inline]
pub fn decode_html(text: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(text)
}

/// Formats an inline error marker containing the given message.
pub fn error_marker(message: &str) -> String {
    format!(
        r#"<strong class="error">{}</strong>"#,
        html_escape::encode_text(message)
    )
}

/// Formats a date according to the given `format` string.
///
/// The `format` string is a PHP-style date formatting string.
///
/// The `date` string may be a Unix timestamp prefixed with `@`, a four-digit
/// year, an ISO date with an optional time, or an RFC 3339 timestamp. Dates
/// without an offset are treated as UTC.
///
/// The value given in `now` will be used as the current time if no `date` is
/// given.
pub fn format_date(
    now: OffsetDateTime,
    format: &str,
    date: Option<&str>,
) -> Result<String, DateError> {
    let date = match date.map(str::trim) {
        None | Some("" | "now") => now,
        Some(date) => parse_date(date)?,
    };
    format_php_date(date, format)
}

/// Parses a timestamp in one of the formats accepted by [`format_date`].
fn parse_date(date: &str) -> Result<OffsetDateTime, DateError> {
    if let Some(timestamp) = date.strip_prefix('@') {
        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| DateError::Parse(date.to_string()))?;
        return Ok(OffsetDateTime::from_unix_timestamp(timestamp)?);
    }

    if date.len() == 4 && date.bytes().all(|b| b.is_ascii_digit()) {
        let year = date
            .parse::<i32>()
            .map_err(|_| DateError::Parse(date.to_string()))?;
        return Ok(Date::from_calendar_date(year, time::Month::January, 1)?
            .midnight()
            .assume_utc());
    }

    if let Ok(date) = OffsetDateTime::parse(date, &Rfc3339) {
        return Ok(date);
    }

    let date_time = PrimitiveDateTime::parse(
        date,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            date,
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        )
    })
    .or_else(|_| {
        Date::parse(date, format_description!("[year]-[month]-[day]"))
            .map(|date| date.with_time(Time::MIDNIGHT))
    })
    .map_err(|_| DateError::Parse(date.to_string()))?;

    Ok(date_time.assume_offset(UtcOffset::UTC))
}

/// Formats a time according to a
/// [PHP date format string](https://www.php.net/manual/en/datetime.format.php).
///
/// Unknown format characters are copied to the output. `\` escapes the next
/// character, and text between double quotes is copied literally.
fn format_php_date(d: OffsetDateTime, format: &str) -> Result<String, DateError> {
    let mut out = String::new();
    let mut f = format.chars();
    let hour12 = match d.hour() % 12 {
        0 => 12,
        hour => hour,
    };
    while let Some(c) = f.next() {
        match c {
            'd' => write!(out, "{:02}", d.day())?,
            'D' => out += &d.weekday().to_string()[..3],
            'j' => write!(out, "{}", d.day())?,
            'l' => write!(out, "{}", d.weekday())?,
            'F' => write!(out, "{}", d.month())?,
            'm' => write!(out, "{:02}", u8::from(d.month()))?,
            'M' => out += &d.month().to_string()[..3],
            'n' => write!(out, "{}", u8::from(d.month()))?,
            'Y' => write!(out, "{:04}", d.year())?,
            'y' => write!(out, "{:02}", d.year().rem_euclid(100))?,
            'a' => out += if d.hour() < 12 { "am" } else { "pm" },
            'A' => out += if d.hour() < 12 { "AM" } else { "PM" },
            'g' => write!(out, "{hour12}")?,
            'G' => write!(out, "{}", d.hour())?,
            'h' => write!(out, "{hour12:02}")?,
            'H' => write!(out, "{:02}", d.hour())?,
            'i' => write!(out, "{:02}", d.minute())?,
            's' => write!(out, "{:02}", d.second())?,
            'U' => write!(out, "{}", d.unix_timestamp())?,
            'c' => {
                let offset = d.offset();
                write!(
                    out,
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}{:02}:{:02}",
                    d.year(),
                    u8::from(d.month()),
                    d.day(),
                    d.hour(),
                    d.minute(),
                    d.second(),
                    if offset.is_negative() { '-' } else { '+' },
                    offset.whole_hours().abs(),
                    offset.minutes_past_hour().abs()
                )?;
            }
            '"' => {
                let rest = f.as_str();
                if let Some(end) = rest.find('"') {
                    out += &rest[..end];
                    f = rest[end + 1..].chars();
                } else {
                    out.push('"');
                }
            }
            '\\' => out.push(f.next().unwrap_or('\\')),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Percent-encodes a URL part.
#[inline]
pub fn url_encode(input: &str) -> percent_encoding::PercentEncode<'_> {
    percent_encoding::utf8_percent_encode(input, &ALPHABET)
}

/// The alphabet of characters to percent-encode when encoding URLs.
const ALPHABET: percent_encoding::AsciiSet = percent_encoding::CONTROLS
    .add(b'%')
    .add(b'#')
    .add(b'?')
    .add(b'\'')
    .add(b'"')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b' ');
