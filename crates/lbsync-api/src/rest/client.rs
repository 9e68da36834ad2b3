// Query API HTTP client
//
// Wraps `reqwest::Client` with request signing and envelope unwrapping.
// Every action is a signed GET against a single endpoint; the action
// name travels in the `Action` query parameter. Endpoint groups
// (load balancers, listeners, backends) are implemented as inherent
// methods in sibling files to keep this module focused on transport.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::auth::{self, Credentials, QUERY_SIGNATURE_METHOD};
use crate::error::{Error, floor_char_boundary};
use crate::rest::models::{Data, Status, TaskResponse, TaskResult};
use crate::task::TaskStatus;
use crate::transport::TransportConfig;

/// Query parameters for one action, before the common signed set is added.
#[derive(Debug, Default, Clone)]
pub(crate) struct Params(BTreeMap<String, String>);

impl Params {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        self.0.insert(key.into(), value.to_string());
    }

    pub(crate) fn insert_opt(&mut self, key: impl Into<String>, value: Option<impl Display>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Raw HTTP client for the provider's signed query API.
///
/// Handles the flat `{ code, message, codeDesc, ... }` envelope: a
/// non-zero `code` becomes [`Error::Api`], otherwise the whole body is
/// deserialized into the caller's payload type.
pub struct RestClient {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
}

impl RestClient {
    /// Create a new query-API client from a `TransportConfig`.
    pub fn new(
        endpoint: Url,
        region: impl Into<String>,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, endpoint, region, credentials))
    }

    /// Create a client with a pre-built `reqwest::Client`.
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

    /// The API endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The region every request is scoped to.
    pub fn region(&self) -> &str {
        &self.region
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Sign and send one action, returning the deserialized body.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        action: &'static str,
        params: Params,
    ) -> Result<T, Error> {
        let mut query = params.0;
        query.insert("Action".into(), action.into());
        query.insert("Region".into(), self.region.clone());
        query.insert("Timestamp".into(), Utc::now().timestamp().to_string());
        query.insert(
            "Nonce".into(),
            (Uuid::new_v4().as_u128() % 1_000_000_000).to_string(),
        );
        query.insert("SecretId".into(), self.credentials.secret_id.clone());
        query.insert("SignatureMethod".into(), QUERY_SIGNATURE_METHOD.into());

        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| Error::Signing(format!("endpoint {} has no host", self.endpoint)))?;
        let signature = auth::sign_query(&self.credentials, host, self.endpoint.path(), &query)?;
        query.insert("Signature".into(), signature);

        debug!(action, "GET {}", self.endpoint);
        let resp = self
            .http
            .get(self.endpoint.clone())
            .query(&query)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(action, resp).await
    }

    /// Send an asynchronous mutation and return its task id, if any.
    pub(crate) async fn call_task(
        &self,
        action: &'static str,
        params: Params,
    ) -> Result<Option<String>, Error> {
        let resp: TaskResponse = self.call(action, params).await?;
        Ok(resp.request_id.map(|id| id.to_string()))
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Query the state of an asynchronous task.
    ///
    /// Action: `DescribeLoadBalancersTaskResult`
    pub async fn describe_task(&self, task_id: &str) -> Result<TaskStatus, Error> {
        trace!(task_id, "polling task");
        let resp: Data<TaskResult> = self
            .call(
                "DescribeLoadBalancersTaskResult",
                Params::new().set("requestId", task_id),
            )
            .await?;
        Ok(TaskStatus::from(resp.data.status))
    }
}

/// Parse the flat envelope, returning the body as `T` when `code == 0`.
async fn parse_envelope<T: DeserializeOwned>(
    action: &'static str,
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body: body[..floor_char_boundary(&body, 200)].to_owned(),
        });
    }

    let header: Status =
        serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))?;
    if header.code != 0 {
        let message = if header.message.is_empty() {
            header.code_desc.unwrap_or_default()
        } else {
            header.message
        };
        debug!(action, code = header.code, %message, "query API error");
        return Err(Error::Api {
            code: header.code.to_string(),
            message,
            request_id: None,
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))
}
