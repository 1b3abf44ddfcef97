pub mod action;
pub mod auth;
pub mod health;
pub mod mutation;
pub mod recurrence;
pub mod situation;
