//! # rulehub-app
//!
//! Application layer: the rule/trigger engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `Gateway`: discover the Things managed by the gateway
//!   - `ThingConnector`: open a live connection to one Thing
//!   - `Clock`: read wall-clock time
//! - Keep a **Thing proxy** per device: property cache, command queue,
//!   connection loop with reconnection and pacing
//! - Provide the **trigger** taxonomy (heartbeat, delay/duration timers,
//!   absolute-time and solar-event triggers)
//! - Bind **rules** to their sources and fan notifications out to them
//! - Run every detection loop from the **rule system**
//!
//! ## Dependency rule
//! Depends on `rulehub-domain` only (plus `tokio` for tasks and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod dispatch;
pub mod ports;
pub mod registry;
pub mod rule;
pub mod rule_system;
pub mod source;
pub mod thing;
pub mod triggers;
