pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerHandle};
