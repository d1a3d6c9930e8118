//! Resilient client: every remote call goes through the retry policy.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use prd_core::{defaults, Error, LocalObject, ObjectType, Result};

use crate::api::RemoteApi;
use crate::config::RemoteConfig;
use crate::policy::{AttemptState, RetryDecision, RetryPolicy};
use crate::transport::{ApiRequest, HttpTransport, Transport};

/// Remote platform client wrapping a transport with the two-tier retry policy.
pub struct RemoteClient<T: Transport = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
    base_url: String,
}

impl RemoteClient<HttpTransport> {
    /// Create an HTTP-backed client from configuration.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(
            transport,
            config.base_url.clone(),
            RetryPolicy::new(config.n_retries),
        ))
    }
}

impl<T: Transport> RemoteClient<T> {
    /// Create a client over any transport.
    pub fn new(transport: T, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// `{base}/{resource}` or `{base}/{resource}/{id}`.
    pub fn resource_url(&self, resource: &str, id: Option<i64>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, resource, id),
            None => format!("{}/{}", self.base_url, resource),
        }
    }

    /// Generic verb call: `call(PATCH, "queues", Some(5), Some(body))`.
    pub async fn call(
        &self,
        method: Method,
        resource: &str,
        id: Option<i64>,
        body: Option<JsonValue>,
    ) -> Result<JsonValue> {
        let mut request = ApiRequest::new(method, self.resource_url(resource, id));
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.execute(&request).await
    }

    /// Send a request, retrying per the policy until success or a terminal error.
    pub async fn execute(&self, request: &ApiRequest) -> Result<JsonValue> {
        let mut state = AttemptState::default();
        loop {
            let outcome = match self.transport.send(request).await {
                Ok(response) => response.into_result(),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            let decision = {
                let mut rng = rand::thread_rng();
                self.policy.decide(&error, &mut state, &mut rng)
            };

            match decision {
                RetryDecision::Retry(delay) => {
                    let attempt = state.rate_limited + state.transient;
                    if error.is_rate_limited() {
                        debug!(
                            method = %request.method,
                            url = %request.url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited, backing off"
                        );
                    } else {
                        warn!(
                            method = %request.method,
                            url = %request.url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Transient remote failure, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }

    fn parse_object(value: JsonValue) -> Result<LocalObject> {
        if !value.is_object() {
            return Err(Error::Serialization(format!(
                "expected a JSON object, got {}",
                value
            )));
        }
        LocalObject::from_value(value)
    }
}

/// Split a list response into its items and the next-page URL.
fn split_page(body: JsonValue) -> Result<(Vec<JsonValue>, Option<String>)> {
    match body {
        JsonValue::Array(items) => Ok((items, None)),
        JsonValue::Object(mut map) => {
            let next = map
                .get("pagination")
                .and_then(|p| p.get("next"))
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            match map.remove("results") {
                Some(JsonValue::Array(items)) => Ok((items, next)),
                _ => Err(Error::Serialization(
                    "list response without a results array".to_string(),
                )),
            }
        }
        other => Err(Error::Serialization(format!(
            "unexpected list response: {}",
            other
        ))),
    }
}

#[async_trait]
impl<T: Transport> RemoteApi for RemoteClient<T> {
    async fn fetch_one(&self, object_type: ObjectType, id: i64) -> Result<LocalObject> {
        let body = self
            .call(Method::GET, object_type.resource(), Some(id), None)
            .await?;
        Self::parse_object(body)
    }

    async fn fetch_all(&self, object_type: ObjectType) -> Result<Vec<LocalObject>> {
        let mut request = ApiRequest::new(Method::GET, self.resource_url(object_type.resource(), None))
            .with_query("page_size", defaults::PAGE_SIZE.to_string());
        let mut objects = Vec::new();
        loop {
            let (items, next) = split_page(self.execute(&request).await?)?;
            for item in items {
                objects.push(Self::parse_object(item)?);
            }
            match next {
                Some(url) => request = ApiRequest::new(Method::GET, url),
                None => break,
            }
        }
        debug!(object_type = %object_type, object_count = objects.len(), "Fetched remote objects");
        Ok(objects)
    }

    async fn create(&self, object_type: ObjectType, body: &LocalObject) -> Result<LocalObject> {
        let response = self
            .call(Method::POST, object_type.resource(), None, Some(body.to_value()?))
            .await?;
        Self::parse_object(response)
    }

    async fn update(&self, object_type: ObjectType, id: i64, body: &LocalObject) -> Result<LocalObject> {
        let response = self
            .call(Method::PATCH, object_type.resource(), Some(id), Some(body.to_value()?))
            .await?;
        Self::parse_object(response)
    }

    async fn delete(&self, object_type: ObjectType, id: i64) -> Result<()> {
        self.call(Method::DELETE, object_type.resource(), Some(id), None)
            .await?;
        Ok(())
    }
}
