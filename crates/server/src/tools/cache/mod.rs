//! Cache management tools.

pub mod purge;
