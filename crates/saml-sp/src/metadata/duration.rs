//! `xs:duration` values.
//!
//! Metadata carries durations such as `cacheDuration` as `xs:duration`; the
//! rest of the engine works in signed milliseconds where a negative value
//! means "unspecified".

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};

use crate::error::SamlError;

/// Sentinel for an absent duration.
pub const UNSPECIFIED_MILLIS: i64 = -1;

/// A parsed `xs:duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XsDuration {
    /// Leading minus sign.
    pub negative: bool,
    /// Years.
    pub years: u32,
    /// Months.
    pub months: u32,
    /// Days.
    pub days: u64,
    /// Hours.
    pub hours: u64,
    /// Minutes.
    pub minutes: u64,
    /// Whole seconds.
    pub seconds: u64,
    /// Millisecond part of the seconds; finer digits are truncated.
    pub millis: u32,
}

impl XsDuration {
    /// Length in milliseconds, measured from the Unix epoch.
    ///
    /// Years and months have calendar length, so `P1M` is 31 days
    /// (January 1970). Returns `None` on overflow.
    #[must_use]
    pub fn as_millis(&self) -> Option<i64> {
        let start = DateTime::<Utc>::from_timestamp(0, 0)?;
        let months = Months::new(self.years.checked_mul(12)?.checked_add(self.months)?);

        let fixed = i64::try_from(self.days)
            .ok()?
            .checked_mul(86_400_000)?
            .checked_add(i64::try_from(self.hours).ok()?.checked_mul(3_600_000)?)?
            .checked_add(i64::try_from(self.minutes).ok()?.checked_mul(60_000)?)?
            .checked_add(i64::try_from(self.seconds).ok()?.checked_mul(1000)?)?
            .checked_add(i64::from(self.millis))?;
        let fixed = Duration::milliseconds(fixed);

        let end = if self.negative {
            start.checked_sub_months(months)?.checked_sub_signed(fixed)?
        } else {
            start.checked_add_months(months)?.checked_add_signed(fixed)?
        };
        Some((end - start).num_milliseconds())
    }
}

/// Converts an optional duration to milliseconds, `-1` when absent.
#[must_use]
pub fn to_millis(duration: Option<&XsDuration>) -> i64 {
    duration
        .and_then(XsDuration::as_millis)
        .unwrap_or(UNSPECIFIED_MILLIS)
}

/// Converts milliseconds back to a duration; negative values mean absent.
///
/// The result uses days and smaller units only, so it converts back to the
/// same millisecond count.
#[must_use]
pub fn to_duration(millis: i64) -> Option<XsDuration> {
    let millis = u64::try_from(millis).ok()?;
    Some(XsDuration {
        negative: false,
        years: 0,
        months: 0,
        days: millis / 86_400_000,
        hours: millis / 3_600_000 % 24,
        minutes: millis / 60_000 % 60,
        seconds: millis / 1000 % 60,
        millis: u32::try_from(millis % 1000).ok()?,
    })
}

impl FromStr for XsDuration {
    type Err = SamlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || SamlError::MetadataFormat(format!("invalid xs:duration '{value}'"));

        let text = value.trim();
        let (negative, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let text = text.strip_prefix('P').ok_or_else(invalid)?;
        let (date_part, time_part) = match text.split_once('T') {
            Some((date, time)) => {
                if time.is_empty() {
                    return Err(invalid());
                }
                (date, Some(time))
            }
            None => (text, None),
        };

        let mut duration = Self {
            negative,
            ..Self::default()
        };
        let mut seen_any = false;

        for (number, designator) in components(date_part, "YMD").ok_or_else(invalid)? {
            let number: u64 = number.parse().map_err(|_| invalid())?;
            match designator {
                'Y' => duration.years = u32::try_from(number).map_err(|_| invalid())?,
                'M' => duration.months = u32::try_from(number).map_err(|_| invalid())?,
                'D' => duration.days = number,
                _ => return Err(invalid()),
            }
            seen_any = true;
        }

        if let Some(time_part) = time_part {
            for (number, designator) in components(time_part, "HMS").ok_or_else(invalid)? {
                match designator {
                    'H' => duration.hours = number.parse().map_err(|_| invalid())?,
                    'M' => duration.minutes = number.parse().map_err(|_| invalid())?,
                    'S' => {
                        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
                        duration.seconds = whole.parse().map_err(|_| invalid())?;
                        if !fraction.chars().all(|c| c.is_ascii_digit()) {
                            return Err(invalid());
                        }
                        let padded: String = fraction.chars().chain("000".chars()).take(3).collect();
                        duration.millis = padded.parse().map_err(|_| invalid())?;
                    }
                    _ => return Err(invalid()),
                }
                seen_any = true;
            }
        }

        if !seen_any || duration.as_millis().is_none() {
            return Err(invalid());
        }
        Ok(duration)
    }
}

/// Splits `12Y3M` into `[("12", 'Y'), ("3", 'M')]`.
///
/// Each designator must come from `designators`, at most once and in order.
fn components<'a>(text: &'a str, designators: &str) -> Option<Vec<(&'a str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut last_rank = None;
    for (index, c) in text.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        let number = &text[start..index];
        let rank = designators.find(c)?;
        if number.is_empty() || last_rank.is_some_and(|last| last >= rank) {
            return None;
        }
        last_rank = Some(rank);
        out.push((number, c));
        start = index + c.len_utf8();
    }
    if start != text.len() {
        return None;
    }
    Some(out)
}

impl fmt::Display for XsDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }

        let has_date = self.years > 0 || self.months > 0 || self.days > 0;
        let has_time = self.hours > 0 || self.minutes > 0 || self.seconds > 0 || self.millis > 0;
        if has_time || !has_date {
            f.write_str("T")?;
        }
        if self.hours > 0 {
            write!(f, "{}H", self.hours)?;
        }
        if self.minutes > 0 {
            write!(f, "{}M", self.minutes)?;
        }
        if self.millis > 0 {
            write!(f, "{}.{:03}S", self.seconds, self.millis)?;
        } else if self.seconds > 0 || !(has_date || has_time) {
            write!(f, "{}S", self.seconds)?;
        }
        Ok(())
    }
}
