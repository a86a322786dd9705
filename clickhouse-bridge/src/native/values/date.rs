use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

fn epoch() -> NaiveDate { DateTime::UNIX_EPOCH.date_naive() }

/// `Date` columns store days since 1970-01-01 as `u16`.
pub(crate) fn date_from_days(days: u16) -> NaiveDate { epoch() + TimeDelta::days(i64::from(days)) }

pub(crate) fn days_from_date(date: NaiveDate) -> Result<u16> {
    let days = date.signed_duration_since(epoch()).num_days();
    u16::try_from(days).map_err(|_| Error::encode(format!("date {date} is outside the Date range")))
}

/// `DateTime` columns store seconds since the epoch as `u32`.
pub(crate) fn datetime_from_secs(secs: u32, tz: Tz) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp(i64::from(secs), 0).unwrap_or_default().with_timezone(&tz)
}

pub(crate) fn secs_from_datetime(datetime: &DateTime<Tz>) -> Result<u32> {
    u32::try_from(datetime.timestamp())
        .map_err(|_| Error::encode(format!("{datetime} is outside the DateTime range")))
}

pub(crate) fn datetime_from_timestamp(secs: i64, tz: Tz) -> Result<DateTime<Tz>> {
    let secs = u32::try_from(secs)
        .map_err(|_| Error::encode(format!("timestamp {secs} is outside the DateTime range")))?;
    Ok(datetime_from_secs(secs, tz))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| parse_naive_datetime(s).map(|dt| dt.date()).ok_or(()))
        .map_err(|()| Error::encode(format!("invalid date literal '{s}'")))
}

/// Interpret a `YYYY-MM-DD[ HH:MM:SS]` literal as wall-clock time in `tz`.
pub(crate) fn parse_datetime(s: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let s = s.trim();
    let naive = parse_naive_datetime(s)
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::default()))
        })
        .ok_or_else(|| Error::encode(format!("invalid datetime literal '{s}'")))?;
    localize(naive, tz)
}

pub(crate) fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::encode(format!("{naive} does not exist in {}", tz.name())))
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_days() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let days = days_from_date(date).unwrap();
        assert_eq!(days, 18_262);
        assert_eq!(date_from_days(days), date);
        assert_eq!(date_from_days(u16::MAX), NaiveDate::from_ymd_opt(2149, 6, 6).unwrap());
        assert!(days_from_date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()).is_err());
    }

    #[test]
    fn test_parse_datetime_in_zone() {
        let tz: Tz = "Europe/Amsterdam".parse().unwrap();
        let dt = parse_datetime("2020-06-01 12:00:00", tz).unwrap();
        assert_eq!(dt.timestamp(), 1_591_005_600);
        assert_eq!(secs_from_datetime(&dt).unwrap(), 1_591_005_600);
        let midnight = parse_datetime("2020-06-01", Tz::UTC).unwrap();
        assert_eq!(midnight.timestamp(), 1_590_969_600);
        assert!(parse_datetime("yesterday", Tz::UTC).is_err());
    }

    #[test]
    fn test_parse_date_accepts_datetime_literal() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        assert_eq!(parse_date("2020-01-03").unwrap(), expected);
        assert_eq!(parse_date("2020-01-03 10:11:12").unwrap(), expected);
        assert!(parse_date("03/01/2020").is_err());
    }

    #[test]
    fn test_timestamp_range() {
        assert!(datetime_from_timestamp(-1, Tz::UTC).is_err());
        assert!(datetime_from_timestamp(i64::from(u32::MAX) + 1, Tz::UTC).is_err());
        assert_eq!(datetime_from_timestamp(0, Tz::UTC).unwrap().timestamp(), 0);
    }
}
