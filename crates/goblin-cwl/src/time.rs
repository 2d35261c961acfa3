//! Parser for the stats API's compact timestamps (`20260105T081925.000Z`).
//!
//! Grammar: `YYYY MM DD 'T' hh mm ss [ '.' f{1,3} ] 'Z'`, all UTC.
//! RFC 3339 input is accepted too.

use chrono::{DateTime, NaiveDate, Utc};

/// The input is not a timestamp we understand.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparseable timestamp: {0:?}")]
pub struct Unparseable(pub String);

/// Parse a compact or RFC 3339 timestamp.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, Unparseable> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_compact(input).ok_or_else(|| Unparseable(input.to_string()))
}

/// Render an instant in the compact wire form.
pub fn format_compact(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

fn parse_compact(input: &str) -> Option<DateTime<Utc>> {
    let mut cursor = Cursor { rest: input.as_bytes() };

    let year = cursor.digits(4)?;
    let month = cursor.digits(2)?;
    let day = cursor.digits(2)?;
    cursor.literal(b'T')?;
    let hour = cursor.digits(2)?;
    let minute = cursor.digits(2)?;
    let second = cursor.digits(2)?;

    let millis = if cursor.literal(b'.').is_some() {
        cursor.fraction_millis()?
    } else {
        0
    };
    cursor.literal(b'Z')?;
    if !cursor.rest.is_empty() {
        return None;
    }

    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?
        .and_hms_milli_opt(hour, minute, second, millis)?;
    Some(naive.and_utc())
}

struct Cursor<'a> {
    rest: &'a [u8],
}

impl Cursor<'_> {
    fn digits(&mut self, n: usize) -> Option<u32> {
        if self.rest.len() < n || !self.rest[..n].iter().all(u8::is_ascii_digit) {
            return None;
        }
        let value = self.rest[..n]
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
        self.rest = &self.rest[n..];
        Some(value)
    }

    fn literal(&mut self, byte: u8) -> Option<()> {
        let (first, rest) = self.rest.split_first()?;
        if *first != byte {
            return None;
        }
        self.rest = rest;
        Some(())
    }

    /// One to three digits, right-padded to milliseconds.
    fn fraction_millis(&mut self) -> Option<u32> {
        let len = self.rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if !(1..=3).contains(&len) {
            return None;
        }
        let value = self.digits(len)?;
        Some(value * 10u32.pow(3 - len as u32))
    }
}
