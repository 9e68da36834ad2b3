#![allow(clippy::unwrap_used)]
// Integration tests for `SdkClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use lbsync_api::sdk::types::{CreateListenerRequest, Target, TargetsRequest};
use lbsync_api::sdk::{CODE_LB_BUSY, SdkClient};
use lbsync_api::{Credentials, Error, TaskStatus};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SdkClient) {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&server.uri()).unwrap();
    let credentials = Credentials::new("AKIDtest", SecretString::from("s3cret".to_string()));
    let client =
        SdkClient::with_client(reqwest::Client::new(), endpoint, "ap-shanghai", credentials);
    (server, client)
}

fn action(name: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("X-TC-Action", name))
}

// ── Envelope tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_headers_and_signature_are_sent() {
    let (server, client) = setup().await;

    action("DescribeLoadBalancers")
        .and(header("X-TC-Version", "2018-03-17"))
        .and(header("X-TC-Region", "ap-shanghai"))
        .and(header_exists("X-TC-Timestamp"))
        .and(header_exists("Authorization"))
        .and(body_partial_json(json!({ "LoadBalancerName": "edge", "Forward": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "TotalCount": 1,
                "LoadBalancerSet": [{
                    "LoadBalancerId": "lb-1",
                    "LoadBalancerName": "edge",
                    "LoadBalancerType": "OPEN",
                    "LoadBalancerVips": ["5.6.7.8"]
                }],
                "RequestId": "req-1"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let lbs = client.describe_load_balancers_by_name("edge").await.unwrap();
    assert_eq!(lbs.len(), 1);
    assert_eq!(lbs[0].load_balancer_id, "lb-1");

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("Authorization")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(auth.starts_with("TC3-HMAC-SHA256 Credential=AKIDtest/"));
    assert!(auth.contains("/clb/tc3_request"));
}

#[tokio::test]
async fn test_error_inside_envelope_is_api_error() {
    let (server, client) = setup().await;

    action("DeleteListener")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Error": {
                    "Code": "FailedOperation.ResourceInOperation",
                    "Message": "lb is busy"
                },
                "RequestId": "req-busy"
            }
        })))
        .mount(&server)
        .await;

    let err = client.delete_listener("lb-1", "lbl-1").await.unwrap_err();
    assert!(err.has_code(CODE_LB_BUSY));
    match err {
        Error::Api {
            message,
            request_id,
            ..
        } => {
            assert_eq!(message, "lb is busy");
            assert_eq!(request_id.as_deref(), Some("req-busy"));
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_envelope_failure_is_http_error() {
    let (server, client) = setup().await;

    action("DescribeTaskStatus")
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>unavailable</html>"))
        .mount(&server)
        .await;

    let result = client.describe_task("req-1").await;
    assert!(
        matches!(result, Err(Error::Http { status: 503, .. })),
        "expected Http error, got: {result:?}"
    );
}

// ── Resource tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_create_listener_returns_id_and_task() {
    let (server, client) = setup().await;

    action("CreateListener")
        .and(body_partial_json(json!({
            "LoadBalancerId": "lb-1",
            "Ports": [443],
            "Protocol": "HTTPS",
            "ListenerNames": ["edge-443"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "ListenerIds": ["lbl-443"], "RequestId": "req-create" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = CreateListenerRequest {
        load_balancer_id: "lb-1".into(),
        ports: vec![443],
        protocol: "HTTPS".into(),
        listener_names: vec!["edge-443".into()],
        ..CreateListenerRequest::default()
    };
    let created = client.create_listener(&req).await.unwrap();
    assert_eq!(created.id, "lbl-443");
    assert_eq!(created.task_id.as_deref(), Some("req-create"));
}

#[tokio::test]
async fn test_register_targets_sends_rule_scope() {
    let (server, client) = setup().await;

    action("RegisterTargets")
        .and(body_partial_json(json!({
            "LocationId": "loc-1",
            "Targets": [{ "EniIp": "10.0.0.1", "Port": 8080, "Weight": 10 }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "RequestId": "req-reg" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = TargetsRequest {
        load_balancer_id: "lb-1".into(),
        listener_id: "lbl-80".into(),
        location_id: Some("loc-1".into()),
        targets: vec![Target {
            eni_ip: "10.0.0.1".into(),
            port: 8080,
            weight: Some(10),
        }],
    };
    let task = client.register_targets(&req).await.unwrap();
    assert_eq!(task.as_deref(), Some("req-reg"));
}

#[tokio::test]
async fn test_describe_task_status() {
    let (server, client) = setup().await;

    action("DescribeTaskStatus")
        .and(body_partial_json(json!({ "TaskId": "req-reg" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": { "Status": 1, "RequestId": "req-poll" }
        })))
        .mount(&server)
        .await;

    assert_eq!(
        client.describe_task("req-reg").await.unwrap(),
        TaskStatus::Failed
    );
}
