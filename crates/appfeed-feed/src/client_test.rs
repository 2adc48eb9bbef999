use super::*;

const LIST: &str =
    "http://feed.test/api/listDetailV1/start/{START}/count/{PAGE_SIZE}/a/tfc/{SECRET}";

#[test]
fn page_request_substitutes_cursor_and_secret() {
    let url = RetryableRequest::page(LIST, "abc", 200, 100).render().unwrap();
    assert_eq!(
        url,
        "http://feed.test/api/listDetailV1/start/200/count/100/a/tfc/abc"
    );
}

#[test]
fn item_request_substitutes_item_id() {
    let url = RetryableRequest::item("http://feed.test/detail/id/{ITEM_ID}/{SECRET}", "k", "19002")
        .render()
        .unwrap();
    assert_eq!(url, "http://feed.test/detail/id/19002/k");
}

#[test]
fn sort_key_is_passed_through() {
    let url = RetryableRequest::page("http://feed.test/l?sort={SORT_KEY}&n={PAGE_SIZE}", "k", 0, 5)
        .with_sort_key("lastModified")
        .render()
        .unwrap();
    assert_eq!(url, "http://feed.test/l?sort=lastModified&n=5");
}

#[test]
fn item_placeholder_without_item_id_is_rejected() {
    let err = RetryableRequest::page("http://feed.test/{ITEM_ID}", "k", 0, 1)
        .render()
        .unwrap_err();
    assert!(
        matches!(err, FeedError::InvalidTemplate { .. }),
        "expected InvalidTemplate, got: {err:?}"
    );
}

#[test]
fn unparseable_template_is_rejected() {
    let err = RetryableRequest::page("not a url {START}", "k", 0, 1)
        .render()
        .unwrap_err();
    assert!(matches!(err, FeedError::InvalidTemplate { .. }));
}

#[test]
fn body_switches_method_to_post() {
    let options = RequestOptions {
        body: Some("q=1".to_owned()),
        ..RequestOptions::default()
    };
    assert_eq!(options.effective_method(), reqwest::Method::POST);

    let empty_body = RequestOptions {
        method: Some(reqwest::Method::HEAD),
        body: Some(String::new()),
        ..RequestOptions::default()
    };
    assert_eq!(empty_body.effective_method(), reqwest::Method::HEAD);
    assert_eq!(
        RequestOptions::default().effective_method(),
        reqwest::Method::GET
    );
}

#[test]
fn header_block_lists_status_and_headers() {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("content-type", "application/json".parse().unwrap());
    let block = render_header_block(
        reqwest::Version::HTTP_11,
        reqwest::StatusCode::OK,
        &headers,
    );
    assert!(block.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(block.contains("content-type: application/json\r\n"));
    assert!(block.ends_with("\r\n\r\n"));
}

#[test]
fn from_config_carries_retry_settings() {
    let feed = FeedConfig {
        list_url: LIST.to_owned(),
        detail_url: "http://feed.test/detail/{ITEM_ID}/{SECRET}".to_owned(),
        secret: Some("k".to_owned()),
        provider_id: 18,
        request_timeout_secs: 5,
        user_agent: "appfeed-test".to_owned(),
        echo_headers: true,
        retry_backoff_base_ms: 250,
        retry_backoff_max_ms: 4_000,
    };
    let client = FeedClient::from_config(&feed, 3).unwrap();
    assert_eq!(
        client.retry_policy(),
        RetryPolicy {
            retry_limit: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 4_000,
        }
    );
    assert_eq!(client.retry_policy().total_attempts(), 4);
}
