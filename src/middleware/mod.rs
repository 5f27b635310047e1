pub mod auth;
pub mod path;
pub mod rate_limit;
