//! Regional endpoint management
//!
//! Tracks writable and readable regional endpoints for the account, marks
//! endpoints unavailable after failures, and resolves the best endpoint for
//! an operation from the preferred-region order.

mod location;
mod manager;

pub use location::{
    locational_endpoint, normalize_location, AccountLocation, AccountReader, DatabaseAccount, Location,
};
pub use manager::{EndpointManager, LOCATION_UNAVAILABLE_EXPIRATION};
