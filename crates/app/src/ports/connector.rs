//! Connector port: live, bidirectional connection to one Thing.
//!
//! A connection is a pair of text-frame halves: a sink for outbound
//! commands and a stream of inbound frames. The stream ending means the
//! peer closed the connection.

use std::pin::Pin;

use futures::future::BoxFuture;
use futures::{Sink, Stream};

use super::BoxError;

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open connection to a Thing.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Failure on a live connection. Always transient: the Thing proxy logs it
/// and reconnects after a backoff.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot connect to {uri}")]
    Connect {
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("connection closed by peer")]
    Closed,
    #[error("connection failure")]
    Io(#[source] BoxError),
}

/// Opens connections to Things.
///
/// The connector is shared by every Thing proxy, hence the object-safe
/// boxed future.
pub trait ThingConnector: Send + Sync {
    /// Connect to `uri`, authenticating with `token`.
    fn connect<'a>(
        &'a self,
        uri: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Connection, TransportError>>;
}
