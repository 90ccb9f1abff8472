//! Channel abstraction for message I/O.

pub mod api;
pub mod channel;
pub mod cli;
pub mod manager;
pub mod markup;
pub mod rate_limit;
pub mod telegram;

pub use api::api_routes;
pub use channel::*;
pub use cli::CliChannel;
pub use manager::ChannelManager;
pub use rate_limit::RateLimiter;
pub use telegram::TelegramChannel;
