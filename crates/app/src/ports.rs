//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the engine and the outside world.
//! They are defined here (in `app`) so that both the engine and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod connector;
pub mod gateway;

pub use clock::{AnchoredClock, Clock, SystemClock};
pub use connector::{Connection, FrameSink, FrameStream, ThingConnector, TransportError};
pub use gateway::{Gateway, GatewayError};

/// Boxed error used to carry adapter-specific failures through a port.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
