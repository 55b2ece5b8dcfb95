//! Default [`HttpTransport`] backed by `reqwest`.

use async_trait::async_trait;
use futures::StreamExt;

use super::{HttpTransport, HttpTransportRequest, HttpTransportResponse};
use crate::error::LlmError;
use crate::types::HttpConfig;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, LlmError> {
        Ok(Self::new(config.build_client()?))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError> {
        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(LlmError::from)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(LlmError::from));
        Ok(HttpTransportResponse::new(status, headers, Box::pin(body)))
    }
}
