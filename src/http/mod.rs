//! HTTP server exposing gated file downloads.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, AppState, StatsResponse, CLIENT_ID_HEADER};
