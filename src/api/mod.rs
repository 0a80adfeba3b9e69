pub mod alerts;
pub mod routes;
pub mod server;
pub mod types;
