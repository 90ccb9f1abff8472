//! Agent module: the assistant core and the loop that feeds it.

pub mod agent_loop;
pub mod assistant;

pub use agent_loop::Agent;
pub use assistant::{AssistRequest, Assistant, Reply, ReplySource};
