pub mod auth;
pub mod loads;
