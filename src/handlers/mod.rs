pub mod attempts;
pub mod auth;
pub mod couples;
pub mod health;
pub mod requests;
pub mod suggestions;
