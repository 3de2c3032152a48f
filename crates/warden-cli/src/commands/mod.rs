//! CLI commands.

pub(crate) mod check;
pub(crate) mod validate;
