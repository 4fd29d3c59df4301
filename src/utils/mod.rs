/// Generate a unique request ID
pub fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let random = rand::random::<u32>();
    format!("req_{timestamp:x}_{random:x}")
}

/// Render a latency compactly: `7ms`, `2.345s`, `2m 5s`, `1h 2m 5s`
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (hours, minutes) {
        (0, 0) if secs == 0 => format!("{}ms", duration.subsec_millis()),
        (0, 0) => format!("{secs}.{:03}s", duration.subsec_millis()),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}
