pub mod auth;
pub mod complaint;
pub mod map;
pub mod upload;

pub use auth::{login, logout, me, signup};
