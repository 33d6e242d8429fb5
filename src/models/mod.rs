//! Data shapes exchanged with the backend and kept in the token store.

pub mod credentials;
pub mod token;
pub mod user;

pub use credentials::{LoginCredentials, RegisterData, RegistrationForm};
pub use token::{AuthResponse, RefreshRequest, RefreshResponse, TokenPair};
pub use user::User;
