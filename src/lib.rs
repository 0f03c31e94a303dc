pub mod args;
pub mod commands;
pub mod context;
pub mod error;
pub mod kerberos;
pub mod ldap;
pub mod output;

pub use context::RunContext;
pub use error::{Error, Result};
