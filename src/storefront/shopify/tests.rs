use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> ShopifyClient {
    ShopifyClient::new(&StorefrontConfig::default())
}

#[test]
fn order_url_quotes_the_hash() {
    let credentials = StorefrontCredentials::new("acme", "t");
    let url = client()
        .orders_url(&credentials, &OrderQuery::Number("1001".to_string()))
        .expect("should build url");

    assert_eq!(url.host_str(), Some("acme.myshopify.com"));
    assert_eq!(url.path(), "/admin/api/2024-01/orders.json");
    assert!(url.as_str().contains("name=%231001"));
    assert!(url.as_str().contains("status=any"));
}

#[tokio::test(flavor = "multi_thread")]
async fn finds_order_by_number_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/orders.json"))
        .and(query_param("name", "#1001"))
        .and(query_param("status", "any"))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [
                {
                    "id": 11,
                    "name": "#1001",
                    "financial_status": "paid",
                    "fulfillments": [
                        { "status": "success", "tracking_number": "1Z999", "tracking_company": "UPS" }
                    ]
                },
                { "id": 12, "name": "#10011" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orders = client()
        .find_orders(
            &StorefrontCredentials::new(&server.uri(), "shpat_test"),
            &OrderQuery::Number("1001".to_string()),
        )
        .await
        .expect("should find orders");

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, 11);
    assert_eq!(orders[0].fulfillments[0].tracking_number.as_deref(), Some("1Z999"));
}

#[tokio::test(flavor = "multi_thread")]
async fn finds_orders_by_email() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/orders.json"))
        .and(query_param("email", "jo@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [{ "id": 1, "name": "#1" }, { "id": 2, "name": "#2" }]
        })))
        .mount(&server)
        .await;

    let orders = client()
        .find_orders(
            &StorefrontCredentials::new(&server.uri(), "t"),
            &OrderQuery::Email("jo@example.com".to_string()),
        )
        .await
        .expect("should find orders");
    assert_eq!(orders.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_failure_is_a_storefront_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let error = client()
        .find_orders(
            &StorefrontCredentials::new(&server.uri(), "bad"),
            &OrderQuery::Number("1".to_string()),
        )
        .await
        .expect_err("401 should fail");

    assert!(matches!(error, SupportError::Storefront(_)));
    assert!(error.to_string().contains("HTTP 401"));
}
