pub mod event;
pub mod upload;
pub mod user;
