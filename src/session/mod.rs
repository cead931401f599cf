//! Session consistency
//!
//! Keeps a vector clock per (container, partition range), merged from every
//! response and attached to later session-consistent requests, so a client
//! reads its own writes across regions.

mod token;
mod tracker;

pub use token::{parse_partitioned, VectorSessionToken};
pub use tracker::{is_master_resource, SessionTracker};
