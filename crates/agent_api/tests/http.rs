use agent_api::headers::HEADER_DIRECTORY;
use agent_api::{AgentApiClient, AgentApiConfig, AgentApiError};
use reqwest::Method;
use std::time::Duration;

#[test]
fn http_request_targets_joined_endpoint_with_timeout() {
    let config = AgentApiConfig::new("http://localhost:4096/")
        .with_directory("/work")
        .with_request_timeout(Duration::from_secs(3));
    let client = AgentApiClient::new(config).expect("client");

    let request = client
        .build_request(Method::GET, "/session")
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(request.url().as_str(), "http://localhost:4096/session");
    assert_eq!(request.method(), "GET");
    assert_eq!(request.timeout(), Some(&Duration::from_secs(3)));
    assert_eq!(
        request
            .headers()
            .get(HEADER_DIRECTORY)
            .and_then(|value| value.to_str().ok()),
        Some("/work")
    );
}

#[test]
fn client_rejects_non_http_base_url() {
    let error = AgentApiClient::new(AgentApiConfig::new("ftp://example.com"))
        .expect_err("ftp base url must fail");
    assert!(matches!(error, AgentApiError::InvalidBaseUrl(_)));
}
