pub mod cli;
pub mod error;
pub mod signals;
pub mod sim;
