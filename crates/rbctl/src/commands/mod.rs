pub mod bridge;
pub mod config;
pub mod lookup;
pub mod replay;
