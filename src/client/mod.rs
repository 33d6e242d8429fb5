//! The authenticated request pipeline: request descriptors, the bearer
//! dispatcher and the single-flight refresh coordinator.

pub mod coordinator;
pub mod dispatcher;
pub mod request;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use dispatcher::{Attempt, DispatchOutcome, RequestDispatcher};
pub use request::{ApiRequest, ApiResponse};
