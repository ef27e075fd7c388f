pub mod health;
pub mod register;
pub mod sessions;
pub mod stats;
pub mod ws;
