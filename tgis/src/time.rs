use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};
use futures::{AsyncRead, AsyncWrite};

use crate::{
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite, Serialize},
};

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// The two time models a map or space time dataset can use.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemporalType {
    /// Calendar time
    Absolute,

    /// Integer offsets in some unit from an unspecified origin
    Relative,
}

impl fmt::Display for TemporalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalType::Absolute => write!(f, "absolute"),
            TemporalType::Relative => write!(f, "relative"),
        }
    }
}

impl FromStr for TemporalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "absolute" => Ok(TemporalType::Absolute),
            "relative" => Ok(TemporalType::Relative),
            _ => Err(Error::validation(format!("unknown temporal type <{s}>"))),
        }
    }
}

impl TryFrom<u8> for TemporalType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(TemporalType::Absolute),
            1 => Ok(TemporalType::Relative),
            _ => Err(Error::Corrupt(format!("bad temporal type: {code}"))),
        }
    }
}

/// Units for relative time and for calendar increments, coarsest first.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    /// Length of the unit in seconds, for the units that have a fixed length.
    pub fn seconds(self) -> Option<i64> {
        match self {
            TimeUnit::Year | TimeUnit::Month => None,
            TimeUnit::Day => Some(86_400),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Minute => Some(60),
            TimeUnit::Second => Some(1),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Year => "years",
            TimeUnit::Month => "months",
            TimeUnit::Day => "days",
            TimeUnit::Hour => "hours",
            TimeUnit::Minute => "minutes",
            TimeUnit::Second => "seconds",
        };

        write!(f, "{name}")
    }
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unit = s.trim().to_lowercase();
        let unit = match unit.as_str() {
            "year" | "years" => TimeUnit::Year,
            "month" | "months" => TimeUnit::Month,
            "day" | "days" => TimeUnit::Day,
            "hour" | "hours" => TimeUnit::Hour,
            "minute" | "minutes" => TimeUnit::Minute,
            "second" | "seconds" => TimeUnit::Second,
            _ => return Err(Error::validation(format!("unknown time unit <{s}>"))),
        };

        Ok(unit)
    }
}

impl TryFrom<u8> for TimeUnit {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        let unit = match code {
            0 => TimeUnit::Year,
            1 => TimeUnit::Month,
            2 => TimeUnit::Day,
            3 => TimeUnit::Hour,
            4 => TimeUnit::Minute,
            5 => TimeUnit::Second,
            _ => return Err(Error::Corrupt(format!("bad time unit: {code}"))),
        };

        Ok(unit)
    }
}

/// The time stamp of a single map.
///
/// `end` is `None` for an instantaneous stamp. When present it is always strictly after `start`,
/// which the constructors enforce.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemporalExtent {
    Absolute {
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    },
    Relative {
        start: i64,
        end: Option<i64>,
        unit: TimeUnit,
    },
}

impl TemporalExtent {
    pub fn absolute(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Result<Self> {
        if let Some(end) = end {
            if end <= start {
                return Err(Error::validation(format!(
                    "end time {end} must be after start time {start}"
                )));
            }
        }

        Ok(TemporalExtent::Absolute { start, end })
    }

    pub fn relative(start: i64, end: Option<i64>, unit: TimeUnit) -> Result<Self> {
        if let Some(end) = end {
            if end <= start {
                return Err(Error::validation(format!(
                    "end time {end} must be after start time {start}"
                )));
            }
        }

        Ok(TemporalExtent::Relative { start, end, unit })
    }

    pub fn temporal_type(&self) -> TemporalType {
        match self {
            TemporalExtent::Absolute { .. } => TemporalType::Absolute,
            TemporalExtent::Relative { .. } => TemporalType::Relative,
        }
    }

    pub fn is_interval(&self) -> bool {
        match self {
            TemporalExtent::Absolute { end, .. } => end.is_some(),
            TemporalExtent::Relative { end, .. } => end.is_some(),
        }
    }

    /// The relative unit, `None` for absolute time
    pub fn unit(&self) -> Option<TimeUnit> {
        match self {
            TemporalExtent::Absolute { .. } => None,
            TemporalExtent::Relative { unit, .. } => Some(*unit),
        }
    }

    /// `(start, end)` if this is absolute time
    pub fn absolute_time(&self) -> Option<(NaiveDateTime, Option<NaiveDateTime>)> {
        match self {
            TemporalExtent::Absolute { start, end } => Some((*start, *end)),
            TemporalExtent::Relative { .. } => None,
        }
    }

    /// `(start, end, unit)` if this is relative time
    pub fn relative_time(&self) -> Option<(i64, Option<i64>, TimeUnit)> {
        match self {
            TemporalExtent::Absolute { .. } => None,
            TemporalExtent::Relative { start, end, unit } => Some((*start, *end, *unit)),
        }
    }
}

#[async_trait]
impl Serialize for TemporalExtent {
    async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        match self {
            TemporalExtent::Absolute { start, end } => {
                stream.write_byte(TemporalType::Absolute as u8).await?;
                stream.write_datetime(start).await?;
                match end {
                    Some(end) => {
                        stream.write_byte(1).await?;
                        stream.write_datetime(end).await?;
                    }
                    None => {
                        stream.write_byte(0).await?;
                    }
                }
            }
            TemporalExtent::Relative { start, end, unit } => {
                stream.write_byte(TemporalType::Relative as u8).await?;
                stream.write_byte(*unit as u8).await?;
                stream.write_i64(*start).await?;
                match end {
                    Some(end) => {
                        stream.write_byte(1).await?;
                        stream.write_i64(*end).await?;
                    }
                    None => {
                        stream.write_byte(0).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn read_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let extent = match TemporalType::try_from(stream.read_byte().await?)? {
            TemporalType::Absolute => {
                let start = stream.read_datetime().await?;
                let end = match stream.read_byte().await? {
                    0 => None,
                    _ => Some(stream.read_datetime().await?),
                };
                TemporalExtent::Absolute { start, end }
            }
            TemporalType::Relative => {
                let unit = TimeUnit::try_from(stream.read_byte().await?)?;
                let start = stream.read_i64().await?;
                let end = match stream.read_byte().await? {
                    0 => None,
                    _ => Some(stream.read_i64().await?),
                };
                TemporalExtent::Relative { start, end, unit }
            }
        };

        Ok(extent)
    }
}

/// A calendar increment, such as "1 day" or "1 month, 12 hours".
///
/// Months (and years) are kept apart from the fixed length part because their length depends on
/// where in the calendar they are applied.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Increment {
    months: i64,
    seconds: i64,
}

impl Increment {
    pub fn of(count: i64, unit: TimeUnit) -> Option<Self> {
        let increment = match unit {
            TimeUnit::Year => Self {
                months: count.checked_mul(12)?,
                seconds: 0,
            },
            TimeUnit::Month => Self {
                months: count,
                seconds: 0,
            },
            _ => Self {
                months: 0,
                seconds: count.checked_mul(unit.seconds()?)?,
            },
        };

        Some(increment)
    }

    pub fn months(&self) -> i64 {
        self.months
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.seconds == 0
    }

    /// This increment taken `times` times
    pub fn times(&self, times: i64) -> Option<Self> {
        Some(Self {
            months: self.months.checked_mul(times)?,
            seconds: self.seconds.checked_mul(times)?,
        })
    }

    /// Apply the increment to a point in time.
    ///
    /// Months are added first, clamping the day of month to the last day of the resulting month.
    /// The fixed length part is then added as an exact duration, which rolls clock fields over
    /// into days, months and years.
    ///
    pub fn add_to(&self, datetime: NaiveDateTime) -> Option<NaiveDateTime> {
        let datetime = if self.months >= 0 {
            datetime.checked_add_months(Months::new(u32::try_from(self.months).ok()?))?
        } else {
            datetime.checked_sub_months(Months::new(u32::try_from(-self.months).ok()?))?
        };

        datetime.checked_add_signed(TimeDelta::try_seconds(self.seconds)?)
    }
}

impl FromStr for Increment {
    type Err = Error;

    /// Parse a comma separated list of `<count> <unit>` terms, e.g. "1 month, 2 days". Weeks are
    /// accepted and counted as seven days.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::validation(format!("unable to parse increment <{s}>"));
        let mut increment = Increment::default();
        for term in s.split(',') {
            let mut words = term.split_whitespace();
            let (count, unit) = match (words.next(), words.next(), words.next()) {
                (Some(count), Some(unit), None) => (count, unit),
                _ => return Err(bad()),
            };
            let count: i64 = count.parse().map_err(|_| bad())?;
            let term = match unit.to_lowercase().as_str() {
                "week" | "weeks" => {
                    Increment::of(count.checked_mul(7).ok_or_else(bad)?, TimeUnit::Day)
                }
                unit => Increment::of(count, unit.parse()?),
            }
            .ok_or_else(bad)?;
            increment = Increment {
                months: increment.months.checked_add(term.months).ok_or_else(bad)?,
                seconds: increment.seconds.checked_add(term.seconds).ok_or_else(bad)?,
            };
        }

        Ok(increment)
    }
}

/// A single point in time as given by a caller, before it is known which map it applies to.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimePoint {
    Absolute(NaiveDateTime),
    Relative(i64),
}

impl TimePoint {
    /// Calendar dates win. Anything else must be an integer offset.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(datetime) = parse_datetime(s) {
            Some(TimePoint::Absolute(datetime))
        } else {
            s.parse().ok().map(TimePoint::Relative)
        }
    }

    pub fn temporal_type(&self) -> TemporalType {
        match self {
            TimePoint::Absolute(_) => TemporalType::Absolute,
            TimePoint::Relative(_) => TemporalType::Relative,
        }
    }
}

/// Parse an ISO style date or date and time, e.g. "2001-01-01" or "2001-01-01 10:30:01"
///
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
