// HTTP API over the engine

pub mod models;
pub mod routes;
pub mod server;
pub mod state;
