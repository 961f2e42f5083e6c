use chrono::Utc;

/// Generates a fresh opaque identifier (UUID v4, string form).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// All persisted timestamps in vigil use this representation.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
