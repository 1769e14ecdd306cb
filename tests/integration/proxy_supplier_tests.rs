//! Integration tests for the proxy supplier and pool
//!
//! These tests use wiremock to stand in for the proxy supplier endpoint.

use phone_harvest::proxy::{HttpProxySupplier, ProxyAddress, ProxyError, ProxyPool};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a supplier pointing at the mock server's `/proxies` endpoint
fn supplier_for(server: &MockServer) -> Arc<HttpProxySupplier> {
    let url = format!("{}/proxies", server.uri());
    Arc::new(HttpProxySupplier::new(url, Duration::from_secs(5)).expect("Failed to build supplier"))
}

fn addresses(pool: &ProxyPool) -> Vec<String> {
    pool.snapshot()
        .iter()
        .map(|a| a.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn test_supplier_list_is_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "1.1.1.1:80\r\n  2.2.2.2:8080  \r\n\r\nhttps://3.3.3.3:443\r\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let pool = ProxyPool::connect(supplier_for(&server), 2).await;

    assert_eq!(
        addresses(&pool),
        vec![
            "http://1.1.1.1:80",
            "http://2.2.2.2:8080",
            "https://3.3.3.3:443"
        ]
    );
    assert_eq!(pool.replenishment_count(), 1);

    // Selection walks the list in order
    assert_eq!(pool.acquire().await.unwrap().as_str(), "http://1.1.1.1:80");
    assert_eq!(pool.acquire().await.unwrap().as_str(), "http://2.2.2.2:8080");
}

#[tokio::test]
async fn test_supplier_error_status_keeps_previous_pool() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let previous = vec![ProxyAddress::parse("9.9.9.9:3128").unwrap()];
    let pool = ProxyPool::with_addresses(supplier_for(&server), 1, previous);

    let result = pool.replenish().await;
    assert!(matches!(
        result,
        Err(ProxyError::SupplierStatus { status: 503 })
    ));
    assert_eq!(addresses(&pool), vec!["http://9.9.9.9:3128"]);
}

#[tokio::test]
async fn test_supplier_empty_body_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  \r\n\r\n"))
        .mount(&server)
        .await;

    let pool = ProxyPool::with_addresses(supplier_for(&server), 1, Vec::new());

    assert!(matches!(pool.replenish().await, Err(ProxyError::EmptyList)));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_empty_pool_refills_from_supplier_on_acquire() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("4.4.4.4:1080\n"))
        .mount(&server)
        .await;

    let pool = ProxyPool::with_addresses(supplier_for(&server), 1, Vec::new());

    let proxy = pool.acquire().await.unwrap();
    assert_eq!(proxy.as_str(), "http://4.4.4.4:1080");
    assert_eq!(pool.count(), 1);
}

#[tokio::test]
async fn test_unreachable_supplier_leaves_pool_empty() {
    // Nothing listens on port 9 of the loopback interface
    let supplier = Arc::new(
        HttpProxySupplier::new("http://127.0.0.1:9/proxies", Duration::from_secs(2)).unwrap(),
    );

    let pool = ProxyPool::connect(supplier, 1).await;
    assert!(pool.is_empty());
    assert!(matches!(
        pool.acquire().await,
        Err(ProxyError::NoProxyAvailable)
    ));
}
