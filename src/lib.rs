//! stay-assist: conversational travel assistant with a guided hotel booking
//! flow and per-scope bounded memory.

pub mod agent;
pub mod booking;
pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod scope;
pub mod search;
pub mod store;
