pub mod api_docs;
pub mod auth;
pub mod config;
pub mod error;
pub mod oauth;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_app;
pub use state::AppState;
pub use sweeper::start_subscription_sweeper;
