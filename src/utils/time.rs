use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

/// This is the standard way of converting a date to a day key in inputstat.
pub fn date_to_day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Day key of the local calendar day containing `moment`.
pub fn day_key(moment: DateTime<Utc>) -> String {
    date_to_day_key(moment.with_timezone(&Local).date_naive())
}

/// Converts a unix timestamp in milliseconds into a date, if it is representable.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

pub fn format_duration(v: Duration) -> String {
    if v.num_days() > 0 {
        format!(
            "{}d{}h{}m",
            v.num_days(),
            v.num_hours() % 24,
            v.num_minutes() % 60
        )
    } else if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
