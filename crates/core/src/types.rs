use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// All timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

/// What a front-end produces when it stringifies a missing job id.
pub const UNDEFINED_JOB_ID: &str = "undefined";

/// Naive layouts the job runner emits (SQLite `CURRENT_TIMESTAMP`, Python
/// `isoformat()` without an offset). Interpreted as UTC.
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Whether `id` can key a status or delete request.
///
/// Empty ids and the literal `"undefined"` are rejected: a job can exist
/// locally before the server has assigned it a real identifier.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.trim().is_empty() && id != UNDEFINED_JOB_ID
}

/// Parse a server timestamp, accepting RFC 3339 or a naive UTC layout.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `deserialize_with` helper: a missing, `null`, or unparseable timestamp
/// becomes `None` instead of failing the whole record.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

/// `deserialize_with` helper: `null` decodes as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `deserialize_with` helper for flags stored as integer columns: accepts
/// `true`/`false`, `0`/`1` (any non-zero number is set), `"true"`/`"1"` and
/// friends, and `null` as unset.
pub fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(flag),
        Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" | "off" => Ok(false),
            "1" | "true" | "yes" | "on" => Ok(true),
            other => Err(D::Error::custom(format!("invalid flag '{other}'"))),
        },
        Some(other) => Err(D::Error::custom(format!("invalid flag {other}"))),
    }
}
