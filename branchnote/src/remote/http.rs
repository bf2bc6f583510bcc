//! HTTP implementation of the remote store
//!
//! Talks to the notes REST API:
//! - `GET    /api/notes?parentId=&limit=&offset=`
//! - `GET    /api/notes/{id}`
//! - `POST   /api/notes`
//! - `PUT    /api/notes/{id}`
//! - `DELETE /api/notes/{id}`

use super::wire::{RemoteEntity, RemoteFields, RemotePage};
use super::RemoteStore;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Remote store backed by the notes REST API
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("branchnote/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::Generic(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn notes_url(&self) -> String {
        format!("{}/api/notes", self.base_url)
    }

    fn note_url(&self, id: &str) -> String {
        format!("{}/api/notes/{}", self.base_url, id)
    }

    async fn send(&self, request: RequestBuilder, token: &str, target: &str) -> Result<Response> {
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let response = request.bearer_auth(token).send().await?;
        check_status(response, target).await
    }
}

/// Map non-success statuses onto the error taxonomy
async fn check_status(response: Response, target: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(target.to_string())),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Server rejected request for {}: {}", target, body);
            Err(AppError::Validation(format!(
                "Server rejected the request ({})",
                status.as_u16()
            )))
        }
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => Err(AppError::NetworkUnavailable(format!(
            "server responded with {}",
            status.as_u16()
        ))),
        _ => Err(AppError::Remote(format!(
            "request failed with status {}",
            status.as_u16()
        ))),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(
        &self,
        token: &str,
        parent_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<RemotePage> {
        let mut query: Vec<(&str, String)> =
            vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(parent_id) = parent_id {
            query.push(("parentId", parent_id.to_string()));
        }

        let request = self.client.get(self.notes_url()).query(&query);
        let response = self
            .send(request, token, parent_id.unwrap_or("root"))
            .await?;

        Ok(response.json::<RemotePage>().await?)
    }

    async fn get(&self, token: &str, id: &str) -> Result<RemoteEntity> {
        let response = self.send(self.client.get(self.note_url(id)), token, id).await?;
        Ok(response.json::<RemoteEntity>().await?)
    }

    async fn create(&self, token: &str, fields: &RemoteFields) -> Result<RemoteEntity> {
        let request = self.client.post(self.notes_url()).json(fields);
        let response = self.send(request, token, &fields.title).await?;
        Ok(response.json::<RemoteEntity>().await?)
    }

    async fn update(&self, token: &str, id: &str, fields: &RemoteFields) -> Result<RemoteEntity> {
        let request = self.client.put(self.note_url(id)).json(fields);
        let response = self.send(request, token, id).await?;
        Ok(response.json::<RemoteEntity>().await?)
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        self.send(self.client.delete(self.note_url(id)), token, id)
            .await?;
        Ok(())
    }
}
