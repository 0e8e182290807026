mod error;
mod protocol;
pub mod routes;
mod server;

pub use error::*;
pub use protocol::*;
pub use server::*;
