/// Default base URL of a locally running backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";

/// Normalize a configured base URL.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) a missing scheme is treated as `http://`
/// 3) trailing slashes are removed
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Join a normalized base URL with an absolute endpoint path.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = normalize_base_url(base_url);
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Percent-encode an identifier for use as a single path segment.
pub fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Path of a per-session endpoint, e.g. `session_path("s1", "message")`.
pub fn session_path(session_id: &str, suffix: &str) -> String {
    let id = encode_path_segment(session_id);
    if suffix.is_empty() {
        format!("/session/{id}")
    } else {
        format!("/session/{id}/{}", suffix.trim_start_matches('/'))
    }
}
