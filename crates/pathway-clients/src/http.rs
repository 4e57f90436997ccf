//! Shared HTTP plumbing for the service clients.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ClientError;

/// One backend's HTTP transport: base URL, shared connection pool, and
/// uniform status/error mapping.
#[derive(Clone)]
pub struct HttpCore {
    client: reqwest::Client,
    base_url: Url,
    service: &'static str,
}

impl HttpCore {
    /// Creates a transport for one service.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: Url, service: &'static str) -> Self {
        Self {
            client,
            base_url,
            service,
        }
    }

    /// The service name used in errors and logs.
    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url.join(path).map_err(|e| {
            tracing::error!(service = self.service, path, error = %e, "Invalid request path");
            ClientError::Transport {
                service: self.service,
            }
        })
    }

    /// GET returning a deserialized 2xx body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .get(self.url(path)?)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.decode(response).await
    }

    /// GET where 404 means the entity is absent rather than an error.
    pub async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Option<T>, ClientError> {
        match self.get_json(path, query, token).await {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// PUT with a JSON body, returning the deserialized 2xx body.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: &str,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .put(self.url(path)?)
            .json(body)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.decode(response).await
    }

    /// DELETE, expecting a 2xx with no meaningful body.
    pub async fn delete(&self, path: &str, token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(path)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.check_status(&response).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        self.check_status(&response).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::warn!(service = self.service, error = %e, "Failed to decode response body");
            ClientError::Decode {
                service: self.service,
            }
        })
    }

    async fn check_status(&self, response: &reqwest::Response) -> Result<(), ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Backend diagnostics stay in the log; callers get the status only.
        tracing::warn!(
            service = self.service,
            status = status.as_u16(),
            "Backend service returned an error status"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                service: self.service,
            });
        }
        Err(ClientError::Status {
            service: self.service,
            status: status.as_u16(),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        tracing::warn!(service = self.service, error = %err, "Backend request failed");
        if err.is_timeout() {
            ClientError::Timeout {
                service: self.service,
            }
        } else {
            ClientError::Transport {
                service: self.service,
            }
        }
    }
}
