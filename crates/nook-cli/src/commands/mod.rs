pub mod common;
pub mod config;
pub mod entry;
pub mod goal;
pub mod pin;
pub mod reminder;
pub mod sync;
pub mod vault;
