//! Collaborators behind the directive passes.

pub mod crypto;
pub mod fetch;
pub mod fs;
pub mod modules;
pub mod sql;
