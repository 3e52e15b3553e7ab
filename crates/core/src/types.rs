/// Wall-clock instant in milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Convert epoch milliseconds to a UTC timestamp, if in range.
pub fn to_timestamp(millis: EpochMillis) -> Option<Timestamp> {
    chrono::DateTime::from_timestamp_millis(millis)
}
