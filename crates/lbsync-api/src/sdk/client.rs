// Async client for the provider's JSON SDK API (version 2018-03-17).
//
// Every action is a POST of a JSON body to the endpoint root.
// Auth: TC3-HMAC-SHA256 `Authorization` header.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::types::{
    self, CreateListenerRequest, CreateLoadBalancerRequest, CreateRuleRequest,
    DeleteListenerRequest, DeleteRuleRequest, DescribeListenersRequest,
    DescribeLoadBalancersRequest, DescribeTargetsRequest, ModifyListenerRequest,
    ModifyRuleRequest, ModifyTargetWeightRequest, TargetsRequest, TaskResponse,
};
use crate::auth::{self, Credentials, TC3_CONTENT_TYPE};
use crate::error::{Error, floor_char_boundary};
use crate::task::{Created, TaskStatus};
use crate::transport::TransportConfig;

const API_VERSION: &str = "2018-03-17";
const SERVICE: &str = "clb";

// ── Envelope shape ───────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct ResponseHeader {
    #[serde(rename = "RequestId", default)]
    request_id: Option<String>,
    #[serde(rename = "Error", default)]
    error: Option<ApiError>,
}

#[derive(serde::Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the SDK-flavoured load balancer API.
pub struct SdkClient {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
}

impl SdkClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(
        endpoint: Url,
        region: impl Into<String>,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, endpoint, region, credentials))
    }

    pub fn with_client(
        http: reqwest::Client,
        endpoint: Url,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            endpoint,
            region: region.into(),
            credentials,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `host[:port]` exactly as reqwest sends it in the `Host` header.
    fn host(&self) -> Result<String, Error> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| Error::Signing(format!("endpoint {} has no host", self.endpoint)))?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        })
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn call<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        action: &'static str,
        body: &B,
    ) -> Result<T, Error> {
        let payload = serde_json::to_vec(body).map_err(|e| Error::Deserialization {
            message: format!("failed to encode {action} request: {e}"),
            body: String::new(),
        })?;
        let timestamp = Utc::now().timestamp();
        let authorization =
            auth::sign_tc3(&self.credentials, SERVICE, &self.host()?, timestamp, &payload)?;

        debug!(action, "POST {}", self.endpoint);
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, TC3_CONTENT_TYPE)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", &self.region)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(payload)
            .send()
            .await
            .map_err(Error::Transport)?;

        handle_response(action, resp).await
    }

    async fn call_task<B: Serialize + Sync>(
        &self,
        action: &'static str,
        body: &B,
    ) -> Result<Option<String>, Error> {
        let resp: TaskResponse = self.call(action, body).await?;
        Ok(resp.request_id)
    }

    // ── Load balancers ───────────────────────────────────────────────

    /// Action: `CreateLoadBalancer`
    pub async fn create_load_balancer(
        &self,
        req: &CreateLoadBalancerRequest,
    ) -> Result<Created, Error> {
        debug!(name = %req.load_balancer_name, "creating load balancer");
        let resp: types::CreateLoadBalancerResponse =
            self.call("CreateLoadBalancer", req).await?;
        let id = resp
            .load_balancer_ids
            .into_iter()
            .next()
            .ok_or(Error::MissingField {
                action: "CreateLoadBalancer",
                field: "LoadBalancerIds",
            })?;
        Ok(Created {
            id,
            task_id: resp.request_id,
        })
    }

    /// Load balancers whose name matches exactly.
    ///
    /// Action: `DescribeLoadBalancers`
    pub async fn describe_load_balancers_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<types::LoadBalancer>, Error> {
        let req = DescribeLoadBalancersRequest {
            load_balancer_name: name.to_owned(),
            forward: 1,
        };
        let resp: types::DescribeLoadBalancersResponse =
            self.call("DescribeLoadBalancers", &req).await?;
        Ok(resp
            .load_balancer_set
            .into_iter()
            .filter(|lb| lb.load_balancer_name == name)
            .collect())
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Action: `CreateListener`
    pub async fn create_listener(&self, req: &CreateListenerRequest) -> Result<Created, Error> {
        debug!(lb_id = %req.load_balancer_id, ports = ?req.ports, "creating listener");
        let resp: types::CreateListenerResponse = self.call("CreateListener", req).await?;
        let id = resp
            .listener_ids
            .into_iter()
            .next()
            .ok_or(Error::MissingField {
                action: "CreateListener",
                field: "ListenerIds",
            })?;
        Ok(Created {
            id,
            task_id: resp.request_id,
        })
    }

    /// Action: `DescribeListeners`
    pub async fn describe_listeners(
        &self,
        req: &DescribeListenersRequest,
    ) -> Result<Vec<types::Listener>, Error> {
        let resp: types::DescribeListenersResponse = self.call("DescribeListeners", req).await?;
        Ok(resp.listeners)
    }

    /// Action: `DeleteListener`
    pub async fn delete_listener(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, "deleting listener");
        let req = DeleteListenerRequest {
            load_balancer_id: lb_id.to_owned(),
            listener_id: listener_id.to_owned(),
        };
        self.call_task("DeleteListener", &req).await
    }

    /// Action: `ModifyListener`
    pub async fn modify_listener(
        &self,
        req: &ModifyListenerRequest,
    ) -> Result<Option<String>, Error> {
        debug!(listener_id = %req.listener_id, "modifying listener");
        self.call_task("ModifyListener", req).await
    }

    // ── Rules ────────────────────────────────────────────────────────

    /// Action: `CreateRule`
    pub async fn create_rules(&self, req: &CreateRuleRequest) -> Result<Option<String>, Error> {
        debug!(listener_id = %req.listener_id, count = req.rules.len(), "creating rules");
        self.call_task("CreateRule", req).await
    }

    /// Action: `ModifyRule`
    pub async fn modify_rule(&self, req: &ModifyRuleRequest) -> Result<Option<String>, Error> {
        debug!(location_id = %req.location_id, "modifying rule");
        self.call_task("ModifyRule", req).await
    }

    /// Action: `DeleteRule`
    pub async fn delete_rules(&self, req: &DeleteRuleRequest) -> Result<Option<String>, Error> {
        debug!(location_ids = ?req.location_ids, "deleting rules");
        self.call_task("DeleteRule", req).await
    }

    // ── Targets ──────────────────────────────────────────────────────

    /// Action: `DescribeTargets`
    pub async fn describe_targets(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Vec<types::ListenerBackend>, Error> {
        let req = DescribeTargetsRequest {
            load_balancer_id: lb_id.to_owned(),
            listener_ids: vec![listener_id.to_owned()],
        };
        let resp: types::DescribeTargetsResponse = self.call("DescribeTargets", &req).await?;
        Ok(resp.listeners)
    }

    /// Action: `RegisterTargets`
    pub async fn register_targets(&self, req: &TargetsRequest) -> Result<Option<String>, Error> {
        debug!(listener_id = %req.listener_id, count = req.targets.len(), "registering targets");
        self.call_task("RegisterTargets", req).await
    }

    /// Action: `DeregisterTargets`
    pub async fn deregister_targets(
        &self,
        req: &TargetsRequest,
    ) -> Result<Option<String>, Error> {
        debug!(listener_id = %req.listener_id, count = req.targets.len(), "deregistering targets");
        self.call_task("DeregisterTargets", req).await
    }

    /// Set one weight on a group of targets.
    ///
    /// Action: `ModifyTargetWeight`
    pub async fn modify_target_weight(
        &self,
        req: &ModifyTargetWeightRequest,
    ) -> Result<Option<String>, Error> {
        debug!(listener_id = %req.listener_id, weight = req.weight, "modifying target weight");
        self.call_task("ModifyTargetWeight", req).await
    }

    // ── Tasks & health ───────────────────────────────────────────────

    /// Action: `DescribeTaskStatus`
    pub async fn describe_task(&self, task_id: &str) -> Result<TaskStatus, Error> {
        trace!(task_id, "polling task");
        let req = types::DescribeTaskStatusRequest {
            task_id: task_id.to_owned(),
        };
        let resp: types::DescribeTaskStatusResponse =
            self.call("DescribeTaskStatus", &req).await?;
        Ok(TaskStatus::from(resp.status))
    }

    /// Action: `DescribeTargetHealth`
    pub async fn describe_target_health(
        &self,
        lb_id: &str,
    ) -> Result<Vec<types::LoadBalancerHealth>, Error> {
        let req = types::DescribeTargetHealthRequest {
            load_balancer_ids: vec![lb_id.to_owned()],
        };
        let resp: types::DescribeTargetHealthResponse =
            self.call("DescribeTargetHealth", &req).await?;
        Ok(resp.load_balancers)
    }
}

/// Unwrap the `Response` envelope into `T`, or the error it carries.
async fn handle_response<T: DeserializeOwned>(
    action: &'static str,
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    // The API reports errors inside a 200 envelope; anything else is a
    // gateway or proxy failure.
    let envelope = match serde_json::from_str::<Envelope>(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(Error::Http {
                status: status.as_u16(),
                body: body[..floor_char_boundary(&body, 200)].to_owned(),
            });
        }
        Err(e) => return Err(Error::deserialization(&e, &body)),
    };

    let header: ResponseHeader = serde_json::from_value(envelope.response.clone())
        .map_err(|e| Error::deserialization(&e, &body))?;
    if let Some(err) = header.error {
        debug!(action, code = %err.code, request_id = ?header.request_id, "SDK API error");
        return Err(Error::Api {
            code: err.code,
            message: err.message,
            request_id: header.request_id,
        });
    }

    serde_json::from_value(envelope.response).map_err(|e| Error::deserialization(&e, &body))
}
