pub mod clock;
pub mod config;
pub mod control;
pub mod link;
pub mod messages;
pub mod motor;
pub mod runtime;
