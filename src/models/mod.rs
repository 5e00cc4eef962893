pub mod attempt;
pub mod couple;
pub mod invite;
pub mod request;
pub mod suggestion;
pub mod user;
