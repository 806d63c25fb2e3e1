//! Dependency graph construction, validation and ordering.

mod cycle;
mod resolve;


pub use resolve::{resolve, resolve_with, DependencyGraph, ResolvedOrder, TieBreak};
