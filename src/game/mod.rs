pub mod local;
pub mod rules;
pub mod session;
