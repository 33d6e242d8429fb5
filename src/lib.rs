//! Library exports for storefront-auth, shared between the binary and tests.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod mock_backend;
pub mod models;
pub mod session;
pub mod startup;
pub mod store;
pub mod utils;

pub use error::ClientError;
pub use session::Session;
