// Public API - what other modules can use
pub use middleware::require_admin;
pub use token::TokenConfig;
pub use types::{AdminClaims, Role};

mod middleware;
mod token;
mod types;
