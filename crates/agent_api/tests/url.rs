use agent_api::url::{encode_path_segment, session_path, DEFAULT_BASE_URL};
use agent_api::{endpoint_url, normalize_base_url};

#[test]
fn url_normalization_defaults_blank_input() {
    assert_eq!(normalize_base_url("   "), DEFAULT_BASE_URL);
}

#[test]
fn url_normalization_trims_trailing_slashes() {
    assert_eq!(
        normalize_base_url("https://agent.example.com/api//"),
        "https://agent.example.com/api"
    );
}

#[test]
fn url_normalization_adds_missing_scheme() {
    assert_eq!(normalize_base_url("192.168.1.5:4096"), "http://192.168.1.5:4096");
}

#[test]
fn endpoint_url_joins_paths_with_single_slash() {
    assert_eq!(
        endpoint_url("http://localhost:4096/", "/session"),
        "http://localhost:4096/session"
    );
}

#[test]
fn session_paths_encode_identifiers() {
    assert_eq!(encode_path_segment("ses_01"), "ses_01");
    assert_eq!(encode_path_segment("a/b c"), "a%2Fb%20c");
    assert_eq!(session_path("s1", "message"), "/session/s1/message");
    assert_eq!(session_path("s1", ""), "/session/s1");
}
