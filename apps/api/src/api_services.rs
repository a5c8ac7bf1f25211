mod bootstrap;
mod database;
mod state_builder;

pub use database::connect_and_migrate;
pub use state_builder::build_app_state;

#[cfg(test)]
pub(crate) use bootstrap::ensure_bootstrap_admin;
#[cfg(test)]
pub(crate) use state_builder::{BackendPorts, assemble_state};
