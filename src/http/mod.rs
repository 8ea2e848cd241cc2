//! HTTP surface: routes, handlers, auth middleware and error mapping

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::build_router;
