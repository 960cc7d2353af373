//! Discovery over the gateway's REST API.

use std::future::Future;

use reqwest::header::ACCEPT;
use rulehub_app::ports::{Gateway, GatewayError};
use rulehub_domain::thing::ThingDescription;

use crate::config::GatewayConfig;
use crate::error::HttpError;

/// [`Gateway`] backed by `GET {host}/things`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    things_url: String,
    token: String,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns [`HttpError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self {
            client,
            things_url: config.things_url(),
            token: config.auth_token.clone(),
        })
    }

    async fn fetch(&self) -> Result<Vec<ThingDescription>, HttpError> {
        tracing::debug!(url = %self.things_url, "fetching things");
        let response = self
            .client
            .get(&self.things_url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(HttpError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status));
        }
        let body = response.bytes().await.map_err(HttpError::Request)?;
        serde_json::from_slice(&body).map_err(HttpError::Decode)
    }
}

impl Gateway for HttpGateway {
    fn fetch_things(
        &self,
    ) -> impl Future<Output = Result<Vec<ThingDescription>, GatewayError>> + Send {
        async move { Ok(self.fetch().await?) }
    }
}
