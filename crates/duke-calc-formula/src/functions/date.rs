//! Date and time functions

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use super::FunctionContext;
use crate::value::Value;

/// Days from 0001-01-01 to 1899-12-30, day zero of the 1900 date system
///
/// The 1900 system counts a 1900-02-29 that never existed, so counting from
/// 1899-12-30 is right for every date after February 1900.
const EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// Serial number of a date-time in the 1900 date system
pub fn serial_from_datetime(dt: NaiveDateTime) -> f64 {
    let days = (dt.date().num_days_from_ce() - EPOCH_DAYS_FROM_CE) as f64;
    let seconds = dt.time().num_seconds_from_midnight() as f64;
    days + seconds / 86_400.0
}

/// NOW() - current date and time as a serial number
pub fn fn_now(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Number(serial_from_datetime(Local::now().naive_local()))
}

/// TODAY() - current date as a serial number
pub fn fn_today(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Number(serial_from_datetime(Local::now().naive_local()).floor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_serial_numbers() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_time(noon);
        assert_eq!(serial_from_datetime(dt), 45292.5);

        let dt = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap().and_time(NaiveTime::MIN);
        assert_eq!(serial_from_datetime(dt), 61.0);
    }

    #[test]
    fn test_today_is_whole_and_not_after_now() {
        let today = fn_today(&[], &FunctionContext::default()).as_number().unwrap();
        let now = fn_now(&[], &FunctionContext::default()).as_number().unwrap();
        assert_eq!(today.fract(), 0.0);
        assert!(today <= now);
        assert!(today > 45_000.0);
    }
}
