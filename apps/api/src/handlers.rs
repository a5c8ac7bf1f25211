pub mod abilities;
pub mod health;
pub mod roles;
