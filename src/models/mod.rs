pub mod admin;
pub mod auth;
pub mod balance;
pub mod petition;
pub mod team;
pub mod user;
