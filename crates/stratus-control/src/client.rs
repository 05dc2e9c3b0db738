//! JSON-over-HTTP client shared by the remote service adapters.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::EndpointConfig;
use crate::error::{ControlError, ControlResult};

/// HTTP client bound to one remote service.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl ServiceClient {
    /// Create a client from an endpoint configuration.
    pub fn new(service: &'static str, config: &EndpointConfig) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            service,
        })
    }

    /// Create a client with a custom base URL.
    pub fn with_url(service: &'static str, url: impl Into<String>) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
            service,
        })
    }

    /// Name of the remote service, used in errors.
    #[must_use]
    pub const fn service(&self) -> &'static str {
        self.service
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
    }

    /// `GET` a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ControlResult<T> {
        let response = self.request(Method::GET, path).send().await?;
        self.decode(response).await
    }

    /// `POST` a JSON body and decode the JSON reply.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> ControlResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path).json(body).send().await?;
        self.decode(response).await
    }

    /// `POST` a JSON body, ignoring the reply body.
    pub async fn post_unit<B>(&self, path: &str, body: &B) -> ControlResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let response = self.request(Method::POST, path).json(body).send().await?;
        self.check(response).await.map(drop)
    }

    /// `PATCH` a JSON body and decode the JSON reply.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> ControlResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.request(Method::PATCH, path).json(body).send().await?;
        self.decode(response).await
    }

    /// `DELETE` a resource, optionally with a JSON body.
    pub async fn delete<B>(&self, path: &str, body: Option<&B>) -> ControlResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut request = self.request(Method::DELETE, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        self.check(response).await.map(drop)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> ControlResult<T> {
        self.check(response)
            .await?
            .json()
            .await
            .map_err(ControlError::Http)
    }

    async fn check(&self, response: Response) -> ControlResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };

        Err(match status {
            StatusCode::BAD_REQUEST => ControlError::InvalidArgument(message),
            StatusCode::NOT_FOUND => ControlError::NotFound(message),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                ControlError::FailedPrecondition(message)
            }
            _ => ControlError::upstream(self.service, message),
        })
    }
}
