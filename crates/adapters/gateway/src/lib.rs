//! # rulehub-adapter-gateway
//!
//! Gateway adapter: reaches the Things managed by a gateway.
//!
//! ## Responsibilities
//! - Implement the `Gateway` port: `GET {host}/things` with a bearer token
//!   ([`HttpGateway`], reqwest)
//! - Implement the `ThingConnector` port: open the live WebSocket of a Thing
//!   with the token as `jwt` query parameter ([`WebSocketConnector`],
//!   tokio-tungstenite)
//!
//! ## Dependency rule
//! Depends on `rulehub-app` (for port traits) and `rulehub-domain` (for
//! the Thing description). The engine never sees reqwest or tungstenite types.

pub mod config;
pub mod error;
pub mod http;
pub mod websocket;

pub use config::GatewayConfig;
pub use error::HttpError;
pub use http::HttpGateway;
pub use websocket::WebSocketConnector;
