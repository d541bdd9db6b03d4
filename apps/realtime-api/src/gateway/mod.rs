pub mod connection;
pub mod events;
pub mod hub;
pub mod registry;
pub mod server;
pub mod session;
