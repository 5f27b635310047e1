pub mod admin;
pub mod auth;
pub mod health;
pub mod metrics;
pub mod petitions;
pub mod profile;
pub mod teams;
