pub mod config;
pub mod controller;

pub use config::Posta;
pub use controller::{Controller, Running};
