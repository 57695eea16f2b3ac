pub mod stats;
pub mod user;
