pub mod config;
pub mod fcc;
pub mod simulate;
