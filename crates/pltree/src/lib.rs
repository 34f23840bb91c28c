//! Data model and plumbing for a PL/SQL-like embedded procedural language:
//! the routine tree, the SQL type model, diagnostics, and the host SQL
//! engine interface.
#![forbid(unsafe_code)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate guard;
#[macro_use]
extern crate serde_derive;

mod error;
pub use error::*;

pub mod ast;
pub mod config;
pub mod hostsql;
pub mod sqlstate;
pub mod types;
