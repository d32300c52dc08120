//! The `transport` module lets producers outside the process publish
//! envelopes into the broker over WebSockets.
//!
//! Each text frame is one JSON request tagged by `type`; every request gets
//! exactly one JSON response on the same connection.

pub mod message;
pub mod websocket;

#[cfg(test)]
mod tests;
