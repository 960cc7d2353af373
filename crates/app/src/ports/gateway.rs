//! Gateway port: discovery of the Things a gateway manages.

use std::future::Future;

use rulehub_domain::thing::ThingDescription;

use super::BoxError;

/// Failure to obtain the list of Things from the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway could not be reached or answered with an error status.
    /// Retried by the engine.
    #[error("gateway is unreachable")]
    Transport(#[source] BoxError),
    /// The gateway answered with something that is not a list of Thing
    /// descriptions. Not retried.
    #[error("gateway response cannot be parsed")]
    Decode(#[source] BoxError),
}

impl GatewayError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Lists the Things known to the gateway.
pub trait Gateway: Send + Sync {
    /// Fetch every Thing description.
    fn fetch_things(
        &self,
    ) -> impl Future<Output = Result<Vec<ThingDescription>, GatewayError>> + Send;
}

impl<T: Gateway> Gateway for std::sync::Arc<T> {
    fn fetch_things(
        &self,
    ) -> impl Future<Output = Result<Vec<ThingDescription>, GatewayError>> + Send {
        (**self).fetch_things()
    }
}
