pub mod client;
pub mod command;
pub mod connection;
pub mod listener;
pub mod session;
pub mod state;

pub use listener::Listener;
pub use session::{Session, SessionConfig};
pub use state::State;
