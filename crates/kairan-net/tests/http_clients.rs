//! Gateway and preview clients against a mock HTTP server.

use kairan_core::{PreviewConfig, PushConfig, PushError, PushGateway, PushMessage, UserId};
use kairan_net::{HttpPushGateway, PreviewError, PreviewFetcher};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn push_config(server: &MockServer, timeout_ms: u64) -> PushConfig {
    PushConfig {
        enabled: true,
        gateway_url: format!("{}/send", server.uri()),
        api_key: Some("secret-key".to_string()),
        timeout_ms,
    }
}

#[tokio::test]
async fn push_posts_json_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(serde_json::json!({
            "recipients": ["1", "2"],
            "title": "回覧板",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(push_config(&server, 2_000)).unwrap();
    let message =
        PushMessage::new(vec![UserId(1), UserId(2)], "回覧板", "回覧板「部室掃除」が届きました。")
            .with_link("https://kairan.test/kairanban/1");
    gateway.send(&message).await.unwrap();
}

#[tokio::test]
async fn push_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(push_config(&server, 2_000)).unwrap();
    let message = PushMessage::new(vec![UserId(1)], "t", "b");
    let err = gateway.send(&message).await.unwrap_err();
    assert!(matches!(err, PushError::Status(502)));
}

#[tokio::test]
async fn push_slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(push_config(&server, 100)).unwrap();
    let message = PushMessage::new(vec![UserId(1)], "t", "b");
    let err = gateway.send(&message).await.unwrap_err();
    assert!(matches!(err, PushError::Timeout), "got {err}");
}

#[tokio::test]
async fn preview_extracts_open_graph_tags() {
    let server = MockServer::start().await;
    let html = r#"<html><head>
        <title>fallback</title>
        <meta property="og:title" content="すごい記事">
        <meta content="https://img.example/cover.png" property="og:image">
        <meta property="og:description" content="要約です">
        </head><body></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let fetcher = PreviewFetcher::new(PreviewConfig::default()).unwrap();
    let preview = fetcher
        .fetch_preview(&format!("{}/article", server.uri()))
        .await
        .unwrap();
    assert_eq!(preview.title, "すごい記事");
    assert_eq!(preview.description.as_deref(), Some("要約です"));
    assert_eq!(preview.image.as_deref(), Some("https://img.example/cover.png"));
}

#[tokio::test]
async fn preview_falls_back_to_title_and_favicon() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>素のページ</title></head></html>"),
        )
        .mount(&server)
        .await;

    let fetcher = PreviewFetcher::new(PreviewConfig::default()).unwrap();
    let preview = fetcher
        .fetch_preview(&format!("{}/plain", server.uri()))
        .await
        .unwrap();
    assert_eq!(preview.title, "素のページ");
    assert!(preview.description.is_none());
    assert!(preview
        .image
        .as_deref()
        .unwrap()
        .starts_with("https://www.google.com/s2/favicons"));
}

#[tokio::test]
async fn preview_error_status_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = PreviewFetcher::new(PreviewConfig::default()).unwrap();
    let err = fetcher
        .fetch_preview(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Status(404)));
}

#[tokio::test]
async fn preview_rejects_non_http_urls() {
    let fetcher = PreviewFetcher::new(PreviewConfig::default()).unwrap();
    let err = fetcher
        .fetch_preview("ftp://example.com/file")
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::InvalidUrl(_)));
}

#[tokio::test]
async fn preview_body_read_is_capped() {
    let server = MockServer::start().await;
    // The og tag sits beyond the cap, so only the fallbacks apply.
    let mut body = String::from("<html><head><title>先頭</title>");
    body.push_str(&" ".repeat(4096));
    body.push_str(r#"<meta property="og:title" content="読まれない"></head></html>"#);
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let config = PreviewConfig {
        max_body_bytes: 1024,
        ..Default::default()
    };
    let fetcher = PreviewFetcher::new(config).unwrap();
    let preview = fetcher
        .fetch_preview(&format!("{}/big", server.uri()))
        .await
        .unwrap();
    assert_eq!(preview.title, "先頭");
}
