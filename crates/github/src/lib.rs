pub mod client;
pub mod error;
pub mod types;
pub mod webhook;

pub use client::*;
pub use error::*;
pub use types::*;
pub use webhook::*;
