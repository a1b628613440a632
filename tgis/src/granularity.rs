use std::fmt;

use chrono::{Datelike, NaiveDateTime};

use crate::{
    errors::{Error, Result},
    helpers::gcd_all,
    time::TimeUnit,
};

/// The finest common temporal step spanning the members of a space time dataset.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Granularity {
    pub count: i64,
    pub unit: TimeUnit,
}

impl Granularity {
    pub fn new(count: i64, unit: TimeUnit) -> Self {
        Self { count, unit }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.unit.to_string();
        if self.count == 1 {
            write!(f, "1 {}", unit.trim_end_matches('s'))
        } else {
            write!(f, "{} {unit}", self.count)
        }
    }
}

/// Granularity of a set of absolute stamps, given as `(start, end)` pairs.
///
/// The deltas considered are the gaps between consecutive distinct start times and the lengths
/// of all intervals. When every delta is a whole number of calendar months the result is in
/// months (or years). Otherwise deltas are measured exactly in seconds and the result is given in
/// the largest unit that divides their greatest common divisor.
///
pub fn absolute_granularity(
    stamps: &[(NaiveDateTime, Option<NaiveDateTime>)],
) -> Option<Granularity> {
    let mut starts: Vec<NaiveDateTime> = stamps.iter().map(|(start, _)| *start).collect();
    starts.sort();
    starts.dedup();

    let mut deltas: Vec<(NaiveDateTime, NaiveDateTime)> = starts
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    for (start, end) in stamps {
        if let Some(end) = end {
            deltas.push((*start, *end));
        }
    }

    if deltas.is_empty() {
        return None;
    }

    let months: Option<Vec<i64>> = deltas.iter().map(|(a, b)| month_delta(a, b)).collect();
    if let Some(months) = months {
        let months = gcd_all(months)?;
        return if months % 12 == 0 {
            Some(Granularity::new(months / 12, TimeUnit::Year))
        } else {
            Some(Granularity::new(months, TimeUnit::Month))
        };
    }

    let seconds = gcd_all(deltas.iter().map(|(a, b)| (*b - *a).num_seconds()))?;
    if seconds == 0 {
        // Sub-second deltas only
        return Some(Granularity::new(1, TimeUnit::Second));
    }
    let unit = [TimeUnit::Day, TimeUnit::Hour, TimeUnit::Minute, TimeUnit::Second]
        .into_iter()
        .find(|unit| seconds % unit.seconds().unwrap_or(1) == 0)
        .unwrap_or(TimeUnit::Second);

    Some(Granularity::new(
        seconds / unit.seconds().unwrap_or(1),
        unit,
    ))
}

/// Granularity of a set of relative stamps which all share `unit`.
///
/// Offsets may lie further apart than an `i64` can hold, so deltas are taken in `i128`. A
/// granularity too large for an `i64` is a validation error.
///
pub fn relative_granularity(
    stamps: &[(i64, Option<i64>)],
    unit: TimeUnit,
) -> Result<Option<Granularity>> {
    let mut starts: Vec<i128> = stamps.iter().map(|(start, _)| *start as i128).collect();
    starts.sort();
    starts.dedup();

    let gaps = starts.windows(2).map(|pair| pair[1] - pair[0]);
    let lengths = stamps
        .iter()
        .filter_map(|(start, end)| end.map(|end| end as i128 - *start as i128));

    match gcd_all(gaps.chain(lengths)) {
        None => Ok(None),
        Some(count) => {
            let count = i64::try_from(count).map_err(|_| {
                Error::validation(format!("granularity of {count} {unit} is out of range"))
            })?;

            Ok(Some(Granularity::new(count, unit)))
        }
    }
}

/// Number of whole calendar months between two points in time, if the second lies a whole number
/// of months after the first.
fn month_delta(a: &NaiveDateTime, b: &NaiveDateTime) -> Option<i64> {
    if a.day() != b.day() || a.time() != b.time() {
        return None;
    }

    let months = (b.year() as i64 - a.year() as i64) * 12 + (b.month() as i64 - a.month() as i64);

    Some(months)
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;

    use super::*;

    use crate::testing::datetime;

    fn days(day: u32) -> NaiveDateTime {
        datetime(2001, 1, day, 0, 0, 0)
    }

    #[test]
    fn daily_intervals() {
        let stamps = vec![(days(1), Some(days(2))), (days(2), Some(days(3)))];
        assert_eq!(
            absolute_granularity(&stamps),
            Some(Granularity::new(1, TimeUnit::Day))
        );
    }

    #[test]
    fn eight_hour_instants() {
        let stamps = vec![
            (datetime(2001, 1, 1, 10, 30, 1), None),
            (datetime(2001, 1, 1, 18, 30, 1), None),
        ];
        let granularity = absolute_granularity(&stamps);
        assert_eq!(granularity, Some(Granularity::new(8, TimeUnit::Hour)));
        assert_eq!(granularity.unwrap().to_string(), "8 hours");
    }

    #[test]
    fn mixed_deltas_reduce() {
        // 2 days and 3 days apart, reduce to 1 day
        let stamps = vec![(days(1), None), (days(3), None), (days(6), None)];
        assert_eq!(
            absolute_granularity(&stamps),
            Some(Granularity::new(1, TimeUnit::Day))
        );

        // 1 day and 90 minutes
        let stamps = vec![
            (days(1), Some(days(2))),
            (days(2), Some(datetime(2001, 1, 2, 1, 30, 0))),
        ];
        assert_eq!(
            absolute_granularity(&stamps),
            Some(Granularity::new(30, TimeUnit::Minute))
        );
    }

    #[test]
    fn calendar_months() {
        let stamps = vec![
            (datetime(2001, 1, 1, 0, 0, 0), Some(datetime(2001, 2, 1, 0, 0, 0))),
            (datetime(2001, 2, 1, 0, 0, 0), Some(datetime(2001, 3, 1, 0, 0, 0))),
            (datetime(2001, 3, 1, 0, 0, 0), Some(datetime(2001, 5, 1, 0, 0, 0))),
        ];
        let granularity = absolute_granularity(&stamps);
        assert_eq!(granularity, Some(Granularity::new(1, TimeUnit::Month)));
        assert_eq!(granularity.unwrap().to_string(), "1 month");

        let stamps = vec![
            (datetime(2001, 1, 1, 0, 0, 0), None),
            (datetime(2003, 1, 1, 0, 0, 0), None),
            (datetime(2007, 1, 1, 0, 0, 0), None),
        ];
        assert_eq!(
            absolute_granularity(&stamps),
            Some(Granularity::new(2, TimeUnit::Year))
        );
    }

    #[test]
    fn single_instant_has_no_granularity() {
        assert_eq!(absolute_granularity(&[(days(1), None)]), None);
        assert_eq!(absolute_granularity(&[]), None);
        assert_eq!(relative_granularity(&[(5, None)], TimeUnit::Day).unwrap(), None);
    }

    #[test]
    fn relative() -> Result<()> {
        let stamps = vec![(0, Some(1)), (1, Some(2))];
        assert_eq!(
            relative_granularity(&stamps, TimeUnit::Day)?,
            Some(Granularity::new(1, TimeUnit::Day))
        );

        let stamps = vec![(1000000, Some(1500000)), (1500000, Some(2000000))];
        assert_eq!(
            relative_granularity(&stamps, TimeUnit::Second)?,
            Some(Granularity::new(500000, TimeUnit::Second))
        );

        Ok(())
    }

    #[test]
    fn relative_offsets_far_apart() -> Result<()> {
        let stamps = vec![(i64::MIN, None), (0, None), (i64::MAX, None)];
        assert_eq!(
            relative_granularity(&stamps, TimeUnit::Day)?,
            Some(Granularity::new(1, TimeUnit::Day))
        );

        let stamps = vec![(i64::MIN, Some(i64::MAX))];
        assert!(matches!(
            relative_granularity(&stamps, TimeUnit::Day),
            Err(Error::Validation(_))
        ));

        let stamps = vec![(i64::MIN, None), (i64::MAX, None)];
        assert!(matches!(
            relative_granularity(&stamps, TimeUnit::Day),
            Err(Error::Validation(_))
        ));

        Ok(())
    }

    #[test]
    fn order_does_not_matter() {
        let mut stamps: Vec<(NaiveDateTime, Option<NaiveDateTime>)> = (1..=20)
            .map(|day| (days(day), Some(days(day + 1))))
            .collect();
        let expected = absolute_granularity(&stamps);

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            stamps.shuffle(&mut rng);
            assert_eq!(absolute_granularity(&stamps), expected);
        }
    }
}
