use std::{fs, path::PathBuf};

use tracing::{debug, warn};

use crate::{
    errors::{Error, Result},
    map::MapType,
    stamp::Stamping,
    time::{Increment, TemporalExtent, TimePoint, TimeUnit},
};

pub const DEFAULT_SEPARATOR: char = '|';

/// Explicit times for a registration, as given by the caller.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemporalParams {
    /// A date ("2001-01-01", "2001-01-01 10:30:01") or an integer offset for relative time
    pub start: Option<String>,

    /// Same form as `start`. Every map gets the interval `[start, end)`.
    pub end: Option<String>,

    /// "1 day", "8 hours", "1 month, 2 days", or an integer for relative time
    pub increment: Option<String>,

    /// Unit for relative time
    pub unit: Option<String>,

    /// Stamp maps with intervals of length `increment` rather than instants
    pub interval: bool,
}

/// A request to register a batch of maps, optionally into a space time dataset.
///
/// Maps are given either as a list of names or as a file with one map per line. A line may carry
/// its own times, separated from the name by `separator`: "name", "name|start" or
/// "name|start|end".
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub map_type: MapType,
    pub dataset: Option<String>,
    pub maps: Option<Vec<String>>,
    pub file: Option<PathBuf>,
    pub params: TemporalParams,
    pub delete_empty: bool,
    pub separator: char,
}

/// A map of a validated request along with the explicit stamp computed for it, if any.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PlannedMap {
    pub name: String,
    pub explicit: Option<TemporalExtent>,
}

impl RegistrationRequest {
    pub fn new(map_type: MapType) -> Self {
        Self {
            map_type,
            dataset: None,
            maps: None,
            file: None,
            params: TemporalParams::default(),
            delete_empty: false,
            separator: DEFAULT_SEPARATOR,
        }
    }

    pub fn dataset<S: Into<String>>(mut self, name: S) -> Self {
        self.dataset = Some(name.into());
        self
    }

    pub fn maps<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.maps = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn start<S: Into<String>>(mut self, start: S) -> Self {
        self.params.start = Some(start.into());
        self
    }

    pub fn end<S: Into<String>>(mut self, end: S) -> Self {
        self.params.end = Some(end.into());
        self
    }

    pub fn increment<S: Into<String>>(mut self, increment: S) -> Self {
        self.params.increment = Some(increment.into());
        self
    }

    pub fn unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.params.unit = Some(unit.into());
        self
    }

    pub fn interval(mut self, interval: bool) -> Self {
        self.params.interval = interval;
        self
    }

    pub fn delete_empty(mut self, delete_empty: bool) -> Self {
        self.delete_empty = delete_empty;
        self
    }

    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Check the request and work out the explicit stamp, if any, of every map in it.
    ///
    /// Everything that can be wrong with the request itself is reported here, before anything is
    /// written.
    ///
    pub(crate) fn plan(&self) -> Result<Vec<PlannedMap>> {
        self.check_params()?;
        let params = &self.params;
        let stamping = stamping(
            params.start.as_deref(),
            params.end.as_deref(),
            params.increment.as_deref(),
            params.unit.as_deref(),
            params.interval,
        )?;

        let lines = match (&self.maps, &self.file) {
            (Some(names), _) => names
                .iter()
                .map(|name| MapLine {
                    name: name.trim().to_string(),
                    start: None,
                    end: None,
                })
                .collect(),
            (None, Some(path)) => {
                debug!(file = %path.display(), "reading map list");
                parse_map_list(&fs::read_to_string(path)?, self.separator)?
            }
            (None, None) => vec![],
        };

        if lines.is_empty() {
            return Err(Error::validation("no maps given"));
        }

        let mut planned = Vec::with_capacity(lines.len());
        let mut temporal_type = None;
        for (index, line) in lines.into_iter().enumerate() {
            if line.name.is_empty() {
                return Err(Error::validation(format!("empty map name at position {}", index + 1)));
            }

            let explicit = match line.start {
                Some(start) => {
                    if stamping != Stamping::Inherit {
                        return Err(Error::validation(format!(
                            "map <{}> has its own time stamp, which conflicts with start, end, \
                             increment and interval",
                            line.name
                        )));
                    }
                    stamping_for_line(&start, line.end.as_deref(), params.unit.as_deref())?
                        .stamp(0)?
                }
                None => stamping.stamp(index)?,
            };

            if let Some(explicit) = &explicit {
                let found = explicit.temporal_type();
                match temporal_type {
                    None => temporal_type = Some(found),
                    Some(expected) if expected != found => {
                        return Err(Error::validation(format!(
                            "map <{}> has {found} time but earlier maps have {expected} time",
                            line.name
                        )));
                    }
                    Some(_) => {}
                }
            }

            planned.push(PlannedMap {
                name: line.name,
                explicit,
            });
        }

        Ok(planned)
    }

    fn check_params(&self) -> Result<()> {
        let params = &self.params;
        let rule = |broken: bool, message: &str| {
            if broken {
                Err(Error::validation(message))
            } else {
                Ok(())
            }
        };

        rule(
            self.maps.is_none() && self.file.is_none(),
            "either maps or file must be given",
        )?;
        rule(
            self.maps.is_some() && self.file.is_some(),
            "maps and file are mutually exclusive",
        )?;
        rule(
            params.end.is_some() && params.start.is_none(),
            "end requires start",
        )?;
        rule(
            params.increment.is_some() && params.start.is_none(),
            "increment requires start",
        )?;
        rule(
            params.interval && params.start.is_none(),
            "interval requires start",
        )?;
        rule(
            params.increment.is_some() && params.end.is_some(),
            "increment and end are mutually exclusive",
        )?;
        rule(
            params.interval && params.end.is_some(),
            "interval and end are mutually exclusive",
        )?;
        rule(
            params.interval && params.increment.is_none(),
            "interval requires increment",
        )?;

        Ok(())
    }
}

struct MapLine {
    name: String,
    start: Option<String>,
    end: Option<String>,
}

/// One map per line. Blank lines and lines starting with '#' are skipped.
fn parse_map_list(text: &str, separator: char) -> Result<Vec<MapLine>> {
    let mut lines = vec![];
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(separator).map(str::trim).collect();
        let line = match fields.as_slice() {
            [name] => MapLine {
                name: name.to_string(),
                start: None,
                end: None,
            },
            [name, start] => MapLine {
                name: name.to_string(),
                start: Some(start.to_string()),
                end: None,
            },
            [name, start, end] => MapLine {
                name: name.to_string(),
                start: Some(start.to_string()),
                end: Some(end.to_string()),
            },
            _ => {
                return Err(Error::validation(format!(
                    "line {} of map list has too many fields: {line}",
                    number + 1
                )))
            }
        };
        lines.push(line);
    }

    Ok(lines)
}

fn stamping_for_line(start: &str, end: Option<&str>, unit: Option<&str>) -> Result<Stamping> {
    stamping(Some(start), end, None, unit, false)
}

/// Turn explicit time parameters into a `Stamping`. Absolute time is used if `start` is a date,
/// relative time if it is an integer and a unit is given.
///
fn stamping(
    start: Option<&str>,
    end: Option<&str>,
    increment: Option<&str>,
    unit: Option<&str>,
    interval: bool,
) -> Result<Stamping> {
    let start = match start {
        Some(start) => parse_point(start, "start")?,
        None => return Ok(Stamping::Inherit),
    };
    let end = end.map(|end| parse_point(end, "end")).transpose()?;
    if let Some(end) = end {
        if end.temporal_type() != start.temporal_type() {
            return Err(Error::validation(
                "start and end must both be dates or both be numbers",
            ));
        }
    }

    let stamping = match start {
        TimePoint::Absolute(start) => {
            if let Some(unit) = unit {
                warn!(unit, "unit is ignored for absolute time");
            }
            let increment = increment.map(parse_increment).transpose()?;
            let end = match end {
                Some(TimePoint::Absolute(end)) => Some(end),
                _ => None,
            };
            Stamping::Absolute {
                start,
                end,
                increment,
                interval,
            }
        }
        TimePoint::Relative(start) => {
            let unit: TimeUnit = unit
                .ok_or_else(|| Error::validation("relative time requires a unit"))?
                .parse()?;
            let increment = increment
                .map(|increment| match increment.trim().parse::<i64>() {
                    Ok(increment) if increment > 0 => Ok(increment),
                    _ => Err(Error::validation(format!(
                        "increment for relative time must be a positive integer, got <{increment}>"
                    ))),
                })
                .transpose()?;
            let end = match end {
                Some(TimePoint::Relative(end)) => Some(end),
                _ => None,
            };
            Stamping::Relative {
                start,
                end,
                increment,
                unit,
                interval,
            }
        }
    };

    // Catches end <= start before anything is written
    if increment.is_none() {
        stamping.stamp(0)?;
    }

    Ok(stamping)
}

fn parse_point(s: &str, what: &str) -> Result<TimePoint> {
    TimePoint::parse(s).ok_or_else(|| {
        Error::validation(format!(
            "unable to parse {what} time <{s}>, expecting a date or an integer"
        ))
    })
}

fn parse_increment(s: &str) -> Result<Increment> {
    let increment: Increment = s.parse()?;
    if increment.is_zero() || increment.months() < 0 || increment.seconds() < 0 {
        return Err(Error::validation(format!("increment <{s}> must be positive")));
    }

    Ok(increment)
}
