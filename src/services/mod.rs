pub mod admin;
pub mod audit;
pub mod auth;
pub mod balance;
pub mod email;
pub mod metrics;
pub mod petitions;
pub mod policy;
pub mod profile;
pub mod teams;
pub mod tokens;
