//! Broadcast hub that fans binary messages from TCP producers out to
//! WebSocket viewers.
//!
//! Producers connect over TCP and write length-prefixed frames; every decoded
//! payload is submitted, unmodified, to a [`hub::Hub`] which copies it onto a
//! bounded queue per viewer. Each viewer session drains its queue onto a
//! WebSocket. A full queue drops the message for that viewer only, so one
//! stalled browser never holds back ingestion or the other viewers.
//!
//! - [`frame`] decodes and encodes the 8-byte big-endian length-prefixed wire
//!   format.
//! - [`hub`] owns the subscriber set and performs fan-out.
//! - [`ingest`] accepts producer connections and runs one frame reader each.
//! - [`gateway`] upgrades `/status` requests and relays messages to viewers,
//!   serving static files everywhere else.
//! - [`generator`] is a synthetic producer emitting random status snapshots.
//! - [`publisher`] sends stdin lines to a running hub.
//! - [`server`] binds the listeners around one hub and runs them together.
//! - [`cli`] parses the command line.
//! - [`error`] holds the error types shared by the modules above.

pub mod cli;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod generator;
pub mod hub;
pub mod ingest;
pub mod publisher;
pub mod server;
