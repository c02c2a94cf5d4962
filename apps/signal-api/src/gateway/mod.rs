pub mod connections;
pub mod server;

pub use connections::{ConnectionInfo, ConnectionRegistry, LocalDispatcher};
