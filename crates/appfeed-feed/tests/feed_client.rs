//! Integration tests for `FeedClient` against a local `wiremock` server.
//!
//! Covers the retry ceiling, header echo, request options, and driving the
//! paginator and detail fetch over real HTTP.

use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appfeed_core::Limit;
use appfeed_feed::client::fetch_detail;
use appfeed_feed::{
    Fetch, FeedClient, FeedError, PageConfig, Paginator, RequestOptions, RetryPolicy,
};

fn test_client(retry_limit: u32, echo_headers: bool) -> FeedClient {
    FeedClient::new(
        5,
        "appfeed-test/0.1",
        RetryPolicy::immediate(retry_limit),
        echo_headers,
    )
    .expect("failed to build test FeedClient")
}

fn list_config(server: &MockServer, page_size: u64, limit: Limit) -> PageConfig {
    PageConfig {
        list_url: format!("{}/list/start/{{START}}/count/{{PAGE_SIZE}}/a/{{SECRET}}", server.uri()),
        secret: "s3cret".to_owned(),
        page_size,
        limit,
        skip_to_page: 0,
        sort_key: "id".to_owned(),
    }
}

#[tokio::test]
async fn always_failing_endpoint_is_tried_retry_limit_plus_one_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let client = test_client(3, false);
    let url = format!("{}/list", server.uri());
    let err = client
        .fetch(&url, &RequestOptions::default())
        .await
        .unwrap_err();

    match err {
        FeedError::RetriesExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 4);
            assert!(last_error.contains("500"), "last_error: {last_error}");
        }
        other => panic!("expected RetriesExhausted, got: {other:?}"),
    }
}

#[tokio::test]
async fn non_200_success_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(1, false);
    let err = client
        .fetch(&format!("{}/list", server.uri()), &RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::RetriesExhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"appId": 1}])))
        .mount(&server)
        .await;

    let client = test_client(3, false);
    let response = client
        .fetch(&format!("{}/list", server.uri()), &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], br#"[{"appId":1}]"#);
    assert!(response.response_header.is_none());
}

#[tokio::test]
async fn header_echo_returns_header_block_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-feed-total", "42")
                .set_body_string("[]"),
        )
        .mount(&server)
        .await;

    let client = test_client(0, true);
    let response = client
        .fetch(&server.uri(), &RequestOptions::default())
        .await
        .unwrap();

    let header_block = response.response_header.expect("header block");
    assert!(header_block.contains("200 OK"));
    assert!(header_block.contains("x-feed-total: 42"));
    assert_eq!(&response.body[..], b"[]");
}

#[tokio::test]
async fn options_set_headers_and_post_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "k1"))
        .and(body_string("term=birds"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(0, false);
    let options = RequestOptions {
        method: None,
        headers: vec![("x-api-key".to_owned(), "k1".to_owned())],
        body: Some("term=birds".to_owned()),
    };
    client
        .fetch(&format!("{}/search", server.uri()), &options)
        .await
        .unwrap();
}

#[tokio::test]
async fn paginator_walks_pages_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list/start/0/count/2/a/s3cret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"appId": 1}, {"appId": 2}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list/start/2/count/1/a/s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"appId": 3}]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(0, false);
    let mut paginator = Paginator::new(&client, list_config(&server, 2, Limit::Items(3)));

    let mut ids = Vec::new();
    while let Some(item) = paginator.next_item().await.unwrap() {
        ids.push(item.item["appId"].as_u64().unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn undecodable_page_stops_unlimited_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(0, false);
    let mut paginator = Paginator::new(&client, list_config(&server, 10, Limit::Unlimited));

    let err = paginator.next_page().await.unwrap_err();
    assert!(matches!(err, FeedError::Decode { page: 1, .. }));
    assert!(paginator.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn detail_fetch_returns_single_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/detail/id/19002/s3cret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"appId": 19002, "company": "Rovio"}])),
        )
        .mount(&server)
        .await;

    let client = test_client(0, false);
    let template = format!("{}/detail/id/{{ITEM_ID}}/{{SECRET}}", server.uri());
    let item = fetch_detail(&client, &template, "s3cret", "19002")
        .await
        .unwrap();
    assert_eq!(item["company"], "Rovio");
}
