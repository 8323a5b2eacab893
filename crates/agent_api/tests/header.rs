use agent_api::headers::{
    build_headers, Accept, HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE,
    HEADER_DIRECTORY, HEADER_USER_AGENT,
};
use agent_api::AgentApiConfig;

#[test]
fn header_map_contains_backend_headers() {
    let config = AgentApiConfig::new("http://localhost:4096")
        .with_directory("/work/project")
        .with_basic_auth(None::<String>, "secret")
        .insert_header("X-Extra", "value");

    let headers = build_headers(&config, Accept::Json).expect("header construction");
    assert_eq!(
        headers.get(HEADER_ACCEPT).expect("accept"),
        &"application/json".to_owned()
    );
    assert_eq!(
        headers.get(HEADER_CONTENT_TYPE).expect("content-type"),
        &"application/json".to_owned()
    );
    // base64("opencode:secret")
    assert_eq!(
        headers.get(HEADER_AUTHORIZATION).expect("authorization"),
        &"Basic b3BlbmNvZGU6c2VjcmV0".to_owned()
    );
    assert_eq!(
        headers.get(HEADER_DIRECTORY).expect("directory"),
        &"/work/project".to_owned()
    );
    assert_eq!(headers.get("x-extra").expect("custom"), &"value".to_owned());
}

#[test]
fn header_map_omits_authorization_without_password() {
    let config = AgentApiConfig::default();
    let headers = build_headers(&config, Accept::EventStream).expect("header construction");

    assert!(!headers.contains_key(HEADER_AUTHORIZATION));
    assert!(!headers.contains_key(HEADER_DIRECTORY));
    assert_eq!(
        headers.get(HEADER_ACCEPT).expect("accept"),
        &"text/event-stream".to_owned()
    );
}

#[test]
fn header_map_prefers_explicit_user_agent() {
    let config = AgentApiConfig::default().with_user_agent("test-agent");
    let headers = build_headers(&config, Accept::Json).expect("header construction");
    assert_eq!(
        headers.get(HEADER_USER_AGENT).expect("user-agent"),
        &"test-agent".to_string()
    );
}

#[test]
fn header_map_rejects_colon_in_username() {
    let config = AgentApiConfig::default().with_basic_auth(Some("a:b"), "secret");
    assert!(build_headers(&config, Accept::Json).is_err());
}
