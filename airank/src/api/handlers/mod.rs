//! Request handlers.

pub mod auth;
pub mod device;
pub mod leaderboard;
pub mod metrics;
pub mod users;
