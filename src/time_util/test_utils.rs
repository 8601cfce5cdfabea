use chrono::{NaiveDate, NaiveTime};

pub fn time(hour: u32, minute: u32, second: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, second).expect(&format!(
        "Expected {:0>2}:{:0>2}:{:0>2} to be a valid time",
        hour, minute, second
    ))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect(&format!(
        "Expected {:0>4}-{:0>2}-{:0>2} to be a valid date",
        year, month, day
    ))
}
