//! Composition of acquire/release scopes into a single enter/exit unit.

mod manager;
mod stack;

#[cfg(test)]
mod tests;

pub use manager::{FnScope, LifespanManager, Scope};
pub use stack::{ScopeHandle, ScopeStack};
