//! The textual time stamp format GRASS attaches to maps, e.g. "1 Jan 2001 10:30:01",
//! "1 Jan 2001/2 Jan 2001" or "1000000 seconds/1500000 seconds".
//!
//! Data stores that keep such strings next to the maps they manage use these functions to hand
//! the stamps to the registration engine as `TemporalExtent`s.
//!
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::{
    errors::{Error, Result},
    time::{TemporalExtent, TimeUnit},
};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

enum Stamp {
    Absolute(NaiveDateTime),
    Relative(i64, TimeUnit),
}

/// Parse a time stamp string. An interval is written as two stamps separated by a slash.
///
pub fn parse_timestamp(s: &str) -> Result<TemporalExtent> {
    let mut parts = s.split('/');
    let start = parse_stamp(parts.next().unwrap_or_default(), s)?;
    let end = match parts.next() {
        Some(part) => Some(parse_stamp(part, s)?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(bad_stamp(s));
    }

    match (start, end) {
        (Stamp::Absolute(start), None) => TemporalExtent::absolute(start, None),
        (Stamp::Absolute(start), Some(Stamp::Absolute(end))) => {
            TemporalExtent::absolute(start, Some(end))
        }
        (Stamp::Relative(start, unit), None) => TemporalExtent::relative(start, None, unit),
        (Stamp::Relative(start, unit), Some(Stamp::Relative(end, end_unit))) => {
            if unit != end_unit {
                return Err(Error::validation(format!(
                    "time stamp <{s}> mixes units {unit} and {end_unit}"
                )));
            }
            TemporalExtent::relative(start, Some(end), unit)
        }
        _ => Err(Error::validation(format!(
            "time stamp <{s}> mixes absolute and relative time"
        ))),
    }
}

/// Format a time stamp in the same form `parse_timestamp` reads.
///
pub fn format_timestamp(extent: &TemporalExtent) -> String {
    match extent {
        TemporalExtent::Absolute { start, end } => match end {
            Some(end) => format!("{} / {}", format_datetime(start), format_datetime(end)),
            None => format_datetime(start),
        },
        TemporalExtent::Relative { start, end, unit } => match end {
            Some(end) => format!(
                "{} / {}",
                format_offset(*start, *unit),
                format_offset(*end, *unit)
            ),
            None => format_offset(*start, *unit),
        },
    }
}

fn format_datetime(datetime: &NaiveDateTime) -> String {
    let month = MONTHS[datetime.month0() as usize];
    let mut month = month.to_string();
    month[..1].make_ascii_uppercase();
    let date = format!("{} {} {}", datetime.day(), month, datetime.year());
    if datetime.num_seconds_from_midnight() == 0 {
        date
    } else {
        format!(
            "{date} {:02}:{:02}:{:02}",
            datetime.hour(),
            datetime.minute(),
            datetime.second()
        )
    }
}

fn format_offset(offset: i64, unit: TimeUnit) -> String {
    let unit = unit.to_string();
    if offset.abs() == 1 {
        format!("{offset} {}", unit.trim_end_matches('s'))
    } else {
        format!("{offset} {unit}")
    }
}

fn bad_stamp(s: &str) -> Error {
    Error::validation(format!("unable to parse time stamp <{s}>"))
}

fn parse_stamp(part: &str, whole: &str) -> Result<Stamp> {
    let words: Vec<&str> = part.split_whitespace().collect();

    // Relative time is always "<count> <unit>"
    if words.len() == 2 {
        if let (Ok(count), Ok(unit)) = (words[0].parse::<i64>(), words[1].parse::<TimeUnit>()) {
            return Ok(Stamp::Relative(count, unit));
        }
    }

    let (day, month, year, time) = match words.as_slice() {
        [year] => (1, 1, *year, None),
        [month, year] => (1, parse_month(month), *year, None),
        [day, month, year] => (day.parse().unwrap_or(0), parse_month(month), *year, None),
        [day, month, year, time] => {
            (day.parse().unwrap_or(0), parse_month(month), *year, Some(*time))
        }
        _ => return Err(bad_stamp(whole)),
    };
    let year: i32 = year.parse().map_err(|_| bad_stamp(whole))?;
    let (hour, minute, second) = match time {
        Some(time) => parse_clock(time).ok_or_else(|| bad_stamp(whole))?,
        None => (0, 0, 0),
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(Stamp::Absolute)
        .ok_or_else(|| bad_stamp(whole))
}

/// Month abbreviation (or full name) to month number, 0 if not a month
fn parse_month(word: &str) -> u32 {
    let word = word.to_lowercase();
    MONTHS
        .iter()
        .position(|month| word.get(..3).is_some_and(|prefix| month.starts_with(prefix)))
        .map(|index| index as u32 + 1)
        .unwrap_or(0)
}

fn parse_clock(time: &str) -> Option<(u32, u32, u32)> {
    let mut fields = time.split(':').map(|field| field.parse::<u32>());
    let hour = fields.next()?.ok()?;
    let minute = fields.next().unwrap_or(Ok(0)).ok()?;
    let second = fields.next().unwrap_or(Ok(0)).ok()?;
    if fields.next().is_some() {
        return None;
    }

    Some((hour, minute, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::datetime;

    #[test]
    fn absolute_interval() -> Result<()> {
        let extent = parse_timestamp("1 Jan 2001/2 Jan 2001")?;
        assert_eq!(
            extent.absolute_time(),
            Some((datetime(2001, 1, 1, 0, 0, 0), Some(datetime(2001, 1, 2, 0, 0, 0))))
        );

        Ok(())
    }

    #[test]
    fn absolute_instant_with_clock() -> Result<()> {
        let extent = parse_timestamp("1 Jan 2001 18:30:01")?;
        assert_eq!(
            extent.absolute_time(),
            Some((datetime(2001, 1, 1, 18, 30, 1), None))
        );

        let extent = parse_timestamp("7 nov 2006 01:09")?;
        assert_eq!(
            extent.absolute_time(),
            Some((datetime(2006, 11, 7, 1, 9, 0), None))
        );

        Ok(())
    }

    #[test]
    fn coarse_absolute() -> Result<()> {
        assert_eq!(
            parse_timestamp("2001")?.absolute_time(),
            Some((datetime(2001, 1, 1, 0, 0, 0), None))
        );
        assert_eq!(
            parse_timestamp("March 2001")?.absolute_time(),
            Some((datetime(2001, 3, 1, 0, 0, 0), None))
        );

        Ok(())
    }

    #[test]
    fn relative() -> Result<()> {
        assert_eq!(
            parse_timestamp("1 day")?.relative_time(),
            Some((1, None, TimeUnit::Day))
        );
        assert_eq!(
            parse_timestamp("1000000 seconds/1500000 seconds")?.relative_time(),
            Some((1000000, Some(1500000), TimeUnit::Second))
        );

        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("32 Jan 2001").is_err());
        assert!(parse_timestamp("1 Foo 2001").is_err());
        assert!(parse_timestamp("1 Jan 2001 25:00:00").is_err());
        assert!(parse_timestamp("1 day/2001").is_err());
        assert!(parse_timestamp("1 day/2 hours").is_err());
        assert!(parse_timestamp("2 Jan 2001/1 Jan 2001").is_err());
        assert!(parse_timestamp("1 day/2 days/3 days").is_err());
    }

    #[test]
    fn non_ascii_month() {
        assert!(parse_timestamp("1 éé 2001").is_err());
        assert!(parse_timestamp("1 Ñandú 2001").is_err());
        assert!(parse_timestamp("1 ü 2001").is_err());
    }

    #[test]
    fn format_parse() -> Result<()> {
        for stamp in [
            "1 Jan 2001 / 2 Jan 2001",
            "1 Jan 2001 10:30:01",
            "1000000 seconds / 1500000 seconds",
            "1 day",
        ] {
            assert_eq!(format_timestamp(&parse_timestamp(stamp)?), stamp);
        }

        Ok(())
    }
}
