//! Execution layer of the Warden engine.
//!
//! - [`Store`]: the persistence seam, called with an explicit [`RlsContext`]
//! - [`MiddlewarePipeline`]: before/after hooks per operation and model
//! - [`Engine`] / [`ModelFacade`]: the CRUD lifecycle tying translation,
//!   access policies, middleware and the store together
//! - [`error_handler`]: engine errors to `{status_code, message, data}`

pub mod dry_run;
pub mod engine;
pub mod error;
pub mod facade;
pub mod middleware;
pub mod rls;
pub mod store;

pub use dry_run::DryRunStore;
pub use engine::{Engine, EngineBuilder};
pub use error::{ErrorResponse, error_handler};
pub use facade::{ModelFacade, UpsertFailure, UpsertSummary};
pub use middleware::{
    Flow, Hook, Middleware, MiddlewareContext, MiddlewarePipeline, Operation, OperationParams,
    QueryParams,
};
pub use rls::RlsContext;
pub use store::{Store, StoreOperation, StoreRequest};
