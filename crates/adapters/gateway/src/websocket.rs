//! Live connection to a Thing over WebSocket.
//!
//! Text frames are passed through as-is. Binary frames are accepted when
//! they hold UTF-8 text; pings and pongs are handled by tungstenite. A
//! close frame ends the inbound stream.

use futures::future::{self, BoxFuture};
use futures::{SinkExt, StreamExt};
use rulehub_app::ports::{Connection, ThingConnector, TransportError};
use tokio_tungstenite::tungstenite::{self, Message};

/// [`ThingConnector`] opening one WebSocket per Thing.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

/// Append the auth token to `uri` as the percent-encoded `jwt` query
/// parameter.
///
/// # Errors
///
/// Returns [`TransportError::Connect`] if `uri` is not an absolute URL.
pub fn authenticated_url(uri: &str, token: &str) -> Result<String, TransportError> {
    let mut url = reqwest::Url::parse(uri).map_err(|err| TransportError::Connect {
        uri: uri.to_string(),
        source: Box::new(err),
    })?;
    url.query_pairs_mut().append_pair("jwt", token);
    Ok(url.into())
}

fn inbound_text(
    message: Result<Message, tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(err) => {
                tracing::warn!(%err, "skipping non UTF-8 binary frame");
                None
            }
        },
        Ok(_) => None,
        Err(err) => Some(Err(TransportError::Io(Box::new(err)))),
    }
}

impl ThingConnector for WebSocketConnector {
    fn connect<'a>(
        &'a self,
        uri: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Connection, TransportError>> {
        Box::pin(async move {
            let url = authenticated_url(uri, token)?;
            let (socket, _) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|err| TransportError::Connect {
                    uri: uri.to_string(),
                    source: Box::new(err),
                })?;
            tracing::debug!(%uri, "websocket open");

            let (sink, stream) = socket.split();
            let sink = sink
                .with(|frame: String| {
                    future::ready(Ok::<_, tungstenite::Error>(Message::Text(frame)))
                })
                .sink_map_err(|err| TransportError::Io(Box::new(err)));
            let stream = stream
                .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
                .filter_map(|message| future::ready(inbound_text(message)));

            Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}
