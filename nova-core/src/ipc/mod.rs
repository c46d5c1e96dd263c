//! Types published to presentation layers over the engine's broadcast channel.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a subscriber
//! can forward them as JSON lines, over a socket or to a display driver.

pub mod events;
