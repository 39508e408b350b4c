pub mod config;
pub mod context;
pub mod date;
pub mod error;
pub mod generation;
pub mod terminal;
