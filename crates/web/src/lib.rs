//! The syncaide endpoint: built-in routes, bundled assets and the listener that
//! feeds accepted sockets to the `syncaide-http` connection engine.
//!
//! ```no_run
//! use syncaide_web::{Server, ServerConfig};
//!
//! # async fn run() -> Result<(), syncaide_web::ServerError> {
//! let server = Server::builder(ServerConfig::default()).build()?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await
//! # }
//! ```

pub mod config;
pub mod endpoints;
pub mod resources;
pub mod router;
pub mod upgrade;

mod server;

pub use config::ServerConfig;
pub use router::Router;
pub use server::{Server, ServerBuilder, ServerError};
