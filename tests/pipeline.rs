//! End-to-end tests for the analysis pipeline.
//!
//! Both the page host and the Messages API are served by wiremock; no real
//! network calls are made.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wcag_alt_text::{Analyzer, Config, Error, FetchError, ImageRole, ParseError, Report};

const PAGE: &str = r#"<!doctype html>
<html>
<head><title>Board games</title><style>body { margin: 0 }</style></head>
<body>
  <header><a href="/home"><img src="/img/logo.jpg" alt=""></a></header>
  <article>
    <h1>Board games for couples</h1>
    <p>Playing together builds trust.</p>
    <figure>
      <img src="images/catan.jpg" alt="Catan">
      <figcaption>Catan on a kitchen table</figcaption>
    </figure>
    <img src="/img/divider.png" role="presentation">
    <img alt="no source at all">
    <p>Try a cooperative game next.</p>
  </article>
</body>
</html>"#;

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::new("test-key");
    config.api_base_url = server.uri();
    config.max_retries = 0;
    config.retry_backoff = Duration::ZERO;
    config
}

/// Messages API response whose single text block is `reply`.
fn messages_reply(reply: &str) -> serde_json::Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-opus-20240229",
        "content": [{"type": "text", "text": reply}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 120, "output_tokens": 20}
    })
}

fn draft_json(role: &str, alt: &str) -> String {
    json!({"role": role, "alt_text": alt}).to_string()
}

async fn mount_page(server: &MockServer, route: &str, html: &'static str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

async fn mount_draft(server: &MockServer, needle: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_string_contains(needle))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn ok_draft(role: &str, alt: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(messages_reply(&draft_json(role, alt)))
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_full_page_analysis() {
    let server = MockServer::start().await;
    mount_page(&server, "/blog/post", PAGE).await;
    mount_draft(&server, "logo.jpg", ok_draft("functional", "Go to the home page"), 1).await;
    mount_draft(
        &server,
        "catan.jpg",
        ok_draft("informative", "Image of a Catan board mid-game with wooden roads"),
        1,
    )
    .await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let url = format!("{}/blog/post", server.uri());
    let report = analyzer.analyze(&url).await.expect("analysis should succeed");

    assert_eq!(report.url(), url);
    assert_eq!(report.total_images(), 3);
    assert_eq!(report.images().len(), 3);

    let srcs: Vec<&str> = report.images().iter().map(|i| i.src.as_str()).collect();
    assert_eq!(
        srcs,
        vec![
            format!("{}/img/logo.jpg", server.uri()),
            format!("{}/blog/images/catan.jpg", server.uri()),
            format!("{}/img/divider.png", server.uri()),
        ]
    );

    let logo = &report.images()[0];
    assert_eq!(logo.role, ImageRole::Functional);
    assert_eq!(logo.suggested_alt.as_deref(), Some("Go to the home page"));
    assert_eq!(logo.existing_alt.as_deref(), Some(""));
    assert_eq!(
        logo.link.as_ref().map(|l| l.url.clone()),
        Some(format!("{}/home", server.uri()))
    );
    assert_eq!(logo.context.before, "");
    assert_eq!(logo.context.after, "");

    let catan = &report.images()[1];
    assert_eq!(catan.role, ImageRole::Informative);
    assert_eq!(
        catan.suggested_alt.as_deref(),
        Some("A Catan board mid-game with wooden roads")
    );
    assert_ne!(catan.suggested_alt, catan.existing_alt);
    assert_eq!(catan.caption.as_deref(), Some("Catan on a kitchen table"));
    assert!(catan.context.before.ends_with("Playing together builds trust."));
    assert!(catan.context.after.starts_with("Catan on a kitchen table"));
    assert!(!catan.context.before.contains("margin"));

    let divider = &report.images()[2];
    assert_eq!(divider.role, ImageRole::Decorative);
    assert_eq!(divider.suggested_alt.as_deref(), Some(""));
    assert!(divider.error.is_none());
}

#[tokio::test]
async fn test_report_written_and_read_back() {
    let server = MockServer::start().await;
    mount_page(&server, "/blog/post", PAGE).await;
    mount_draft(&server, "logo.jpg", ok_draft("functional", "Go to the home page"), 1).await;
    mount_draft(&server, "catan.jpg", ok_draft("informative", "Catan board mid-game"), 1).await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let report = analyzer
        .analyze(&format!("{}/blog/post", server.uri()))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = report.write_to_dir(dir.path()).unwrap();
    let name = file.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("image_analysis_127.0.0.1_"));
    assert!(name.ends_with(".json"));

    let parsed = Report::from_json(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(parsed, report);
}

// ============================================================================
// Per-image classification failures
// ============================================================================

#[tokio::test]
async fn test_service_error_marks_only_that_image_unknown() {
    let server = MockServer::start().await;
    mount_page(&server, "/blog/post", PAGE).await;
    mount_draft(&server, "logo.jpg", ok_draft("functional", "Go to the home page"), 1).await;
    mount_draft(
        &server,
        "catan.jpg",
        ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })),
        1,
    )
    .await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let report = analyzer
        .analyze(&format!("{}/blog/post", server.uri()))
        .await
        .expect("a classification failure must not abort the run");

    assert_eq!(report.total_images(), 3);
    assert_eq!(report.images()[0].role, ImageRole::Functional);

    let catan = &report.images()[1];
    assert_eq!(catan.role, ImageRole::Unknown);
    assert!(catan.suggested_alt.is_none());
    let error = catan.error.as_deref().unwrap();
    assert!(error.contains("529"), "unexpected error: {}", error);
    assert!(error.contains("overloaded_error"), "unexpected error: {}", error);

    assert_eq!(report.images()[2].role, ImageRole::Decorative);
}

#[tokio::test]
async fn test_unparseable_reply_marks_image_unknown() {
    let server = MockServer::start().await;
    mount_page(&server, "/single", r#"<html><body><img src="a.png"></body></html>"#).await;
    mount_draft(
        &server,
        "a.png",
        ResponseTemplate::new(200)
            .set_body_json(messages_reply("Here is some alt text: a lovely photo")),
        1,
    )
    .await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let report = analyzer
        .analyze(&format!("{}/single", server.uri()))
        .await
        .unwrap();

    let image = &report.images()[0];
    assert_eq!(image.role, ImageRole::Unknown);
    assert!(image.suggested_alt.is_none());
    assert!(image.error.as_deref().unwrap().contains("unparseable"));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    mount_page(&server, "/single", r#"<html><body><img src="a.png"></body></html>"#).await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_draft(&server, "a.png", ok_draft("informative", "Team photo at the offsite"), 1).await;

    let mut config = test_config(&server);
    config.max_retries = 1;
    let analyzer = Analyzer::new(config).unwrap();
    let report = analyzer
        .analyze(&format!("{}/single", server.uri()))
        .await
        .unwrap();

    let image = &report.images()[0];
    assert_eq!(image.role, ImageRole::Informative);
    assert_eq!(image.suggested_alt.as_deref(), Some("Team photo at the offsite"));
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    mount_page(&server, "/single", r#"<html><body><img src="a.png"></body></html>"#).await;
    mount_draft(
        &server,
        "a.png",
        ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })),
        1,
    )
    .await;

    let mut config = test_config(&server);
    config.max_retries = 3;
    let analyzer = Analyzer::new(config).unwrap();
    let report = analyzer
        .analyze(&format!("{}/single", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.images()[0].role, ImageRole::Unknown);
    assert!(report.images()[0]
        .error
        .as_deref()
        .unwrap()
        .contains("authentication_error"));
}

// ============================================================================
// Fatal errors
// ============================================================================

#[tokio::test]
async fn test_upstream_error_aborts_without_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("output");

    let result = analyzer.analyze(&format!("{}/missing", server.uri())).await;
    if let Ok(report) = &result {
        report.write_to_dir(&out).unwrap();
    }

    match result {
        Err(Error::Fetch(FetchError::Upstream(status))) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected upstream fetch error, got {:?}", other),
    }
    assert!(!out.exists());
}

#[tokio::test]
async fn test_unreachable_host_is_a_fetch_error() {
    let server = MockServer::start().await;
    let analyzer = Analyzer::new(test_config(&server)).unwrap();

    // Port 9 (discard) has no listener in test environments.
    let result = analyzer.analyze("http://127.0.0.1:9/post").await;
    assert!(
        matches!(result, Err(Error::Fetch(FetchError::Request(_)))),
        "expected request error, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_fetching() {
    let server = MockServer::start().await;
    let analyzer = Analyzer::new(test_config(&server)).unwrap();

    let result = analyzer.analyze("mailto:someone@example.com").await;
    assert!(matches!(result, Err(Error::Fetch(FetchError::InvalidUrl(_)))));
}

#[tokio::test]
async fn test_non_html_response_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": []})))
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(test_config(&server)).unwrap();
    let result = analyzer.analyze(&format!("{}/data.json", server.uri())).await;
    assert!(matches!(result, Err(Error::Parse(ParseError::NotHtml(_)))));
}
