#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use lbsync_api::rest::models::{BackendTarget, ListenerRequest, PROTOCOL_TCP};
use lbsync_api::rest::{CODE_RATE_LIMITED, RestClient};
use lbsync_api::{Credentials, Error, TaskStatus};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&server.uri()).unwrap();
    let credentials = Credentials::new("AKIDtest", SecretString::from("s3cret".to_string()));
    let client =
        RestClient::with_client(reqwest::Client::new(), endpoint, "ap-guangzhou", credentials);
    (server, client)
}

fn action(name: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("Action", name))
}

// ── Envelope tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_common_parameters_are_signed_and_sent() {
    let (server, client) = setup().await;

    action("DescribeLoadBalancers")
        .and(query_param("Region", "ap-guangzhou"))
        .and(query_param("SecretId", "AKIDtest"))
        .and(query_param("SignatureMethod", "HmacSHA256"))
        .and(query_param("loadBalancerName", "edge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "",
            "loadBalancerSet": [
                {
                    "unLoadBalancerId": "lb-1",
                    "loadBalancerName": "edge",
                    "loadBalancerType": 2,
                    "loadBalancerVips": ["1.2.3.4"]
                },
                {
                    "unLoadBalancerId": "lb-2",
                    "loadBalancerName": "edge-old",
                    "loadBalancerType": 2
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let lbs = client.describe_load_balancers_by_name("edge").await.unwrap();
    assert_eq!(lbs.len(), 1, "fuzzy matches must be filtered out");
    assert_eq!(lbs[0].id, "lb-1");
    assert_eq!(lbs[0].load_balancer_vips, vec!["1.2.3.4".to_string()]);

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap_or_default();
    assert!(query.contains("Signature="), "query was: {query}");
    assert!(query.contains("Nonce="), "query was: {query}");
}

#[tokio::test]
async fn test_nonzero_code_is_api_error() {
    let (server, client) = setup().await;

    action("DescribeForwardLBListeners")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 4400,
            "message": "",
            "codeDesc": "RequestLimitExceeded"
        })))
        .mount(&server)
        .await;

    let result = client.describe_listeners("lb-1", None, Some(80)).await;
    match result {
        Err(err @ Error::Api { .. }) => {
            assert!(err.has_code(CODE_RATE_LIMITED));
            assert!(err.to_string().contains("RequestLimitExceeded"));
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_failure_is_http_error() {
    let (server, client) = setup().await;

    action("DescribeForwardLBListeners")
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let result = client.describe_listeners("lb-1", None, None).await;
    assert!(
        matches!(result, Err(Error::Http { status: 502, .. })),
        "expected Http error, got: {result:?}"
    );
}

// ── Listener tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_create_4layer_listener_flattens_request() {
    let (server, client) = setup().await;

    action("CreateForwardLBFourthLayerListeners")
        .and(query_param("loadBalancerId", "lb-1"))
        .and(query_param("listeners.0.loadBalancerPort", "9000"))
        .and(query_param("listeners.0.protocol", "2"))
        .and(query_param("listeners.0.listenerName", "edge-9000"))
        .and(query_param("listeners.0.scheduler", "wrr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "listenerIds": ["lbl-9000"],
            "requestId": 1234
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ListenerRequest {
        name: "edge-9000".into(),
        port: 9000,
        protocol: PROTOCOL_TCP,
        scheduler: "wrr".into(),
        ..ListenerRequest::default()
    };
    let created = client.create_4layer_listener("lb-1", &request).await.unwrap();
    assert_eq!(created.id, "lbl-9000");
    assert_eq!(created.task_id.as_deref(), Some("1234"));
}

#[tokio::test]
async fn test_create_listener_without_ids_is_missing_field() {
    let (server, client) = setup().await;

    action("CreateForwardLBSeventhLayerListeners")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let result = client
        .create_7layer_listener("lb-1", &ListenerRequest::default())
        .await;
    assert!(
        matches!(result, Err(Error::MissingField { field: "listenerIds", .. })),
        "expected MissingField, got: {result:?}"
    );
}

#[tokio::test]
async fn test_describe_listeners_parses_rules() {
    let (server, client) = setup().await;

    action("DescribeForwardLBListeners")
        .and(query_param("loadBalancerPort", "80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "listenerSet": [{
                "listenerId": "lbl-80",
                "listenerName": "edge-80",
                "protocol": 1,
                "loadBalancerPort": 80,
                "rules": [
                    { "locationId": "loc-1", "domain": "a.com", "url": "/x", "healthSwitch": 1 },
                    { "locationId": "loc-2", "domain": "a.com", "url": "/y" }
                ]
            }]
        })))
        .mount(&server)
        .await;

    let listeners = client.describe_listeners("lb-1", None, Some(80)).await.unwrap();
    assert_eq!(listeners.len(), 1);
    let rules: Vec<_> = listeners[0].rules.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(rules, vec!["/x", "/y"]);
    assert_eq!(listeners[0].rules[0].health_switch, 1);
}

// ── Backend tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_register_backends_returns_task_id() {
    let (server, client) = setup().await;

    action("RegisterInstancesWithForwardLBFourthListener")
        .and(query_param("backends.0.lanIp", "10.0.0.1"))
        .and(query_param("backends.0.port", "8080"))
        .and(query_param("backends.0.weight", "10"))
        .and(query_param("backends.1.lanIp", "10.0.0.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "requestId": 77
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backends = vec![
        BackendTarget {
            ip: "10.0.0.1".into(),
            port: 8080,
            weight: 10,
        },
        BackendTarget {
            ip: "10.0.0.2".into(),
            port: 8080,
            weight: 10,
        },
    ];
    let task = client
        .register_4layer_backends("lb-1", "lbl-9000", &backends)
        .await
        .unwrap();
    assert_eq!(task.as_deref(), Some("77"));
}

#[tokio::test]
async fn test_describe_task_maps_status() {
    let (server, client) = setup().await;

    action("DescribeLoadBalancersTaskResult")
        .and(query_param("requestId", "77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "status": 2 }
        })))
        .mount(&server)
        .await;

    let status = client.describe_task("77").await.unwrap();
    assert_eq!(status, TaskStatus::Dealing);
}
