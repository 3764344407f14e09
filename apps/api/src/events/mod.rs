pub mod calendar;
pub mod handlers;
pub mod store;
