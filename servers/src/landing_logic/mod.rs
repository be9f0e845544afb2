pub mod config;
pub mod jsonp;
pub mod logger;
pub mod routes;
pub mod state;
