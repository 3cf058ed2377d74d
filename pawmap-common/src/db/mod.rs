//! Canonical store schema and shared queries

pub mod init;
pub mod reference;
pub mod settings;

pub use init::*;
pub use reference::*;
pub use settings::*;
