// HTTP payload runner

use crate::errors::ExecutionError;
use crate::runner::{JobContext, JobRunner};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// HTTP request methods supported by the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

/// Parameters carried by an `http` job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestParams {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// HttpRunner executes HTTP request payloads
pub struct HttpRunner {
    client: Client,
}

impl HttpRunner {
    /// Create a new HttpRunner with the specified request timeout
    pub fn new(timeout_seconds: u64) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                ExecutionError::HttpRequestFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn convert_method(method: &HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
        }
    }
}

#[async_trait]
impl JobRunner for HttpRunner {
    async fn run(&self, ctx: &JobContext) -> Result<(), ExecutionError> {
        let params: HttpRequestParams = serde_json::from_value(ctx.params.clone())
            .map_err(|e| ExecutionError::InvalidParams(e.to_string()))?;

        debug!(
            job_name = %ctx.job_name,
            url = %params.url,
            "Executing HTTP payload"
        );

        let mut request = self
            .client
            .request(Self::convert_method(&params.method), &params.url);
        for (key, value) in &params.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &params.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::HttpRequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::UnexpectedStatus {
                status: status.as_u16(),
                url: params.url,
            });
        }

        Ok(())
    }
}
