//! # rulehub-domain
//!
//! Pure domain model for the rulehub rule/trigger engine.
//!
//! ## Responsibilities
//! - Foundational types: error conventions, timestamps, times of day
//! - Parse human duration strings (`"10s"`, `"5m"`, `"2h"`, `"1d"`)
//! - Describe **Things** as announced by the gateway (descriptor + schema)
//! - Encode/decode the **live protocol** spoken over a Thing's connection
//! - Compute **solar events** (sunrise, dusk, golden hour, …) for a location
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod duration;
pub mod error;
pub mod time;

pub mod protocol;
pub mod solar;
pub mod thing;
