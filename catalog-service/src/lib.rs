pub mod api_error;
pub mod app;
pub mod config;
pub mod metrics;
pub mod movie_handlers;
pub mod seed;
pub mod tokens;
pub mod user_handlers;

pub use app::AppState;
