pub mod routes;

pub use routes::{create_router, ApiError, AppState, UpdateResponse};
