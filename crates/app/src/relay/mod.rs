//! The relay service: accepts image uploads, runs them past the detection
//! endpoint, notifies a chat webhook on a subject of interest, and keeps a
//! bounded queue of recent detections for the status endpoint.
//!
//! Submodules:
//! - `config`: environment-driven settings with stock defaults.
//! - `data`: queue records and the JSON view of the status endpoint.
//! - `queue`: the bounded FIFO with file-deleting eviction.
//! - `server`: Actix Web routes, the upload orchestrator, CORS.

pub(crate) use config::RelayConfig;
pub(crate) use server::serve;

mod config;
mod data;
mod queue;
mod server;
