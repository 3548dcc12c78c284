use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::dispatch::{QueryRequest, Transport};
use crate::error::{decode_reply, QueryError};
use crate::state::QueryResponse;

/// HTTP client for the RAG backend.
#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: String,
}

impl RagClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One `POST /query` round trip, with the reply classified.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return Err(QueryError::ServerError);
        }

        let body = response.text().await?;
        decode_reply(status.as_u16(), &body)
    }

    /// Liveness check against `GET /health`.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Backend health check failed with status: {}. Make sure the RAG backend is running at {}",
                response.status(),
                self.base_url
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for RagClient {
    async fn send(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        self.query(request).await
    }
}
