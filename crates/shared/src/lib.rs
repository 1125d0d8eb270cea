//! Pharmadesk Shared Types
//!
//! Domain vocabulary shared by the realtime client and any other consumer:
//! identifiers, roles, sessions and support tickets.

pub mod error;
pub mod session;
pub mod types;

pub use error::*;
pub use session::{Session, SessionClaims};
pub use types::*;
