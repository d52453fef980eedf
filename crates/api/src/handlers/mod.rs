pub mod auth;
pub mod health;
pub mod scenarios;
pub mod tasks;
pub mod worker;
