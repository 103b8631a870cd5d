pub mod admin;
pub mod auth;
pub mod phrase;
pub mod verify;
