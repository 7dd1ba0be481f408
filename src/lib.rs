//! Client for the local control API of a home battery gateway.
//!
//! [`tedapi`] speaks the protobuf-over-HTTPS protocol and hands back raw
//! payloads; [`status`] turns those payloads into system and device status.

pub mod status;
pub mod tedapi;

pub use tedapi::{Din, Gateway, GatewayConfig, GatewayError, Query, Target};
