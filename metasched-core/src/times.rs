use chrono::{Local, NaiveDateTime, TimeZone};

pub const SQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders epoch seconds as `YYYY-MM-DD HH:MM:SS` in the local zone,
/// the format stored in the database and shown to interactive clients.
pub fn local_to_sql(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.format(SQL_TIME_FORMAT).to_string())
        .unwrap_or_else(|| "1970-01-01 00:00:00".to_string())
}

pub fn sql_to_local(sql: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(sql, SQL_TIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single().map(|dt| dt.timestamp())
}

/// Renders a duration in seconds as `H:MM:SS`, the form used in the
/// `W=` part of job messages.
pub fn duration_to_sql(duration: i64) -> String {
    let duration = duration.max(0);
    format!("{}:{:02}:{:02}", duration / 3600, (duration % 3600) / 60, duration % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_rendering() {
        assert_eq!(duration_to_sql(0), "0:00:00");
        assert_eq!(duration_to_sql(59), "0:00:59");
        assert_eq!(duration_to_sql(600), "0:10:00");
        assert_eq!(duration_to_sql(3661), "1:01:01");
        assert_eq!(duration_to_sql(90061), "25:01:01");
    }

    #[test]
    fn test_sql_round_trip() {
        let epoch = 1754000000;
        assert_eq!(sql_to_local(&local_to_sql(epoch)), Some(epoch));
    }
}
