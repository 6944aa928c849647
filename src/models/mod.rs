pub mod captain;
pub mod event;
pub mod identity;
pub mod ride;
pub mod route;
