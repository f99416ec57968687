//! Aerovitals backend: sleep-disorder and stress-level prediction, an
//! inflight medical chat relay and heart-rate helpers behind one HTTP API.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod model;
pub mod predict;
pub mod registry;
pub mod schema;
pub mod types;
pub mod vitals;
