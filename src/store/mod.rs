//! Persistence layer, libSQL-backed storage for the conversation log and
//! the participant registry.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChatGroup, ConversationTurn, Database, Participant, TurnRole};
