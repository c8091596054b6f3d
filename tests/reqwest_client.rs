use std::time::Duration;

use edgesweep::{FanoutRequest, HttpClient, ReqwestHttpClient};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_returns_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>warm</html>"))
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new().unwrap();
    let request = FanoutRequest::get(format!("{}/page", server.uri()), Duration::from_secs(5));
    let response = client.execute(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>warm</html>");
    assert!(response.is_success());
}

#[tokio::test]
async fn post_forwards_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/zones/zone1/purge_cache"))
        .and(header("X-Auth-Email", "owner@example.com"))
        .and(header("X-Auth-Key", "secret"))
        .and(header("Content-Type", "application/json"))
        .and(body_string(r#"{"files":["https://example.com/a"]}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new().unwrap();
    let request = FanoutRequest::post(
        format!("{}/zones/zone1/purge_cache", server.uri()),
        r#"{"files":["https://example.com/a"]}"#,
        Duration::from_secs(30),
    )
    .header("X-Auth-Email", "owner@example.com")
    .header("X-Auth-Key", "secret")
    .header("Content-Type", "application/json");

    let response = client.execute(&request).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn non_success_status_is_returned_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new().unwrap();
    let request = FanoutRequest::get(format!("{}/missing", server.uri()), Duration::from_secs(5));
    let response = client.execute(&request).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn slow_origin_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new().unwrap();
    let request = FanoutRequest::get(
        format!("{}/slow", server.uri()),
        Duration::from_millis(100),
    );
    let result = client.execute(&request).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn head_requests_carry_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ReqwestHttpClient::new().unwrap();
    let request = FanoutRequest::head(
        format!("{}/sitemap.xml", server.uri()),
        Duration::from_secs(5),
    );
    let response = client.execute(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}
