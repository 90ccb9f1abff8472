//! Guided hotel booking dialogue.

pub mod dates;
pub mod flow;
pub mod intent;
pub mod render;
pub mod state;
pub mod store;

pub use flow::{BookingFlowEngine, FlowOutcome, FlowResponse, StepOutcome};
pub use intent::{GeneralKind, IntentClassifier, IntentSignal, KeywordClassifier};
pub use state::{BookingSlots, BookingStep, DialogueState, ReadySearch, SlotPatch};
pub use store::ConversationStateStore;
