//! The assistant core: one entry point per inbound message.
//!
//! Order per message: registry touch, context window read, user turn
//! recorded, booking flow first, LLM when the flow passes, reply recorded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::booking::{BookingFlowEngine, FlowOutcome};
use crate::llm::{PromptHints, Responder};
use crate::memory::ContextWindowManager;
use crate::scope::ConversationScope;
use crate::search::SearchOutcome;
use crate::store::{Database, TurnRole};

/// Lock-map size above which idle scope locks are dropped.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// One message handed to the assistant.
#[derive(Debug, Clone)]
pub struct AssistRequest {
    pub scope: ConversationScope,
    pub text: String,
    pub display_name: String,
    pub group_name: Option<String>,
}

impl AssistRequest {
    pub fn new(scope: ConversationScope, text: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            scope,
            text: text.into(),
            display_name: display_name.into(),
            group_name: None,
        }
    }

    pub fn with_group_name(mut self, name: Option<String>) -> Self {
        self.group_name = name;
        self
    }
}

/// Which path produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    BookingFlow,
    Llm,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub search: Option<SearchOutcome>,
    pub source: ReplySource,
}

pub struct Assistant {
    flow: BookingFlowEngine,
    memory: ContextWindowManager,
    responder: Responder,
    db: Arc<dyn Database>,
    scope_locks: Mutex<HashMap<ConversationScope, Arc<tokio::sync::Mutex<()>>>>,
}

impl Assistant {
    pub fn new(
        flow: BookingFlowEngine,
        memory: ContextWindowManager,
        responder: Responder,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            flow,
            memory,
            responder,
            db,
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory(&self) -> &ContextWindowManager {
        &self.memory
    }

    fn scope_lock(&self, scope: &ConversationScope) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .scope_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.len() >= LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(scope.clone()).or_default().clone()
    }

    /// Handle one message. Messages for the same scope run one at a time in
    /// arrival order; other scopes proceed in parallel.
    pub async fn handle(&self, request: &AssistRequest) -> Reply {
        let lock = self.scope_lock(&request.scope);
        let _guard = lock.lock().await;
        let scope = &request.scope;

        debug!(%scope, chars = request.text.len(), "Handling message");
        self.touch_registry(request).await;

        let window = match self.memory.get_window(scope, None).await {
            Ok(window) => window,
            Err(e) => {
                warn!(%scope, error = %e, "Failed to load context window");
                Vec::new()
            }
        };

        if let Err(e) = self.memory.append_turn(scope, TurnRole::User, &request.text).await {
            warn!(%scope, error = %e, "Failed to record user turn");
        }

        let reply = match self
            .flow
            .handle(scope, &request.text, &request.display_name)
            .await
        {
            FlowOutcome::Handled(response) => {
                info!(%scope, "Booking flow handled message");
                Reply {
                    text: response.text,
                    search: response.search,
                    source: ReplySource::BookingFlow,
                }
            }
            FlowOutcome::NotHandled => {
                let hints = PromptHints {
                    display_name: Some(request.display_name.clone()),
                    is_group: scope.is_group(),
                    group_name: request.group_name.clone(),
                };
                Reply {
                    text: self.responder.respond(&window, &request.text, &hints).await,
                    search: None,
                    source: ReplySource::Llm,
                }
            }
        };

        if let Err(e) = self.memory.append_turn(scope, TurnRole::Assistant, &reply.text).await {
            warn!(%scope, error = %e, "Failed to record assistant turn");
        }

        reply
    }

    /// Drop any in-progress booking dialogue for the scope.
    pub async fn reset(&self, scope: &ConversationScope) {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;
        self.flow.states().clear(scope);
        info!(%scope, "Conversation state reset");
    }

    async fn touch_registry(&self, request: &AssistRequest) {
        if let Err(e) = self
            .db
            .touch_participant(&request.scope, &request.display_name)
            .await
        {
            warn!(scope = %request.scope, error = %e, "Failed to record participant");
        }
        if let Some(group_id) = request.scope.group_id() {
            if let Err(e) = self
                .db
                .touch_group(group_id, request.group_name.as_deref())
                .await
            {
                warn!(group_id, error = %e, "Failed to record group");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::booking::{ConversationStateStore, KeywordClassifier};
    use crate::clock::SystemClock;
    use crate::config::{AssistConfig, BookingConfig};
    use crate::error::{LlmError, SearchError};
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::search::{
        HotelSearch, HotelSummary, LocationMatch, PropertyRooms, PropertySearch, RegionResults,
        RegionSearch, SearchMeta,
    };
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) struct EchoLlm {
        pub calls: AtomicUsize,
        pub history_sizes: Mutex<Vec<usize>>,
    }

    impl EchoLlm {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                history_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // system + window + new message
            self.history_sizes
                .lock()
                .unwrap()
                .push(request.messages.len() - 2);
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse {
                content: format!("echo: {last}"),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    pub(crate) struct BaliSearch;

    #[async_trait]
    impl HotelSearch for BaliSearch {
        async fn search_location(&self, query: &str) -> Result<Option<LocationMatch>, SearchError> {
            Ok(query.to_lowercase().contains("bali").then(|| LocationMatch::Region {
                region_id: "bali-1".into(),
                name: "Bali, Indonesia".into(),
            }))
        }

        async fn search_by_region(&self, _request: &RegionSearch) -> Result<RegionResults, SearchError> {
            Ok(RegionResults {
                hotels: vec![HotelSummary {
                    id: "h1".into(),
                    name: "Kuta Beach Hotel".into(),
                    price: dec!(750000),
                    promo_price: None,
                    is_promo: false,
                    star_class: 4,
                    review_score: None,
                    address: "Jl. Pantai Kuta".into(),
                    city: "Badung".into(),
                    latitude: None,
                    longitude: None,
                }],
                meta: SearchMeta {
                    total: 1,
                    page: 1,
                    max_page: 1,
                },
            })
        }

        async fn search_property_rooms(
            &self,
            _request: &PropertySearch,
        ) -> Result<PropertyRooms, SearchError> {
            Ok(PropertyRooms::default())
        }
    }

    pub(crate) async fn test_assistant() -> (Assistant, Arc<EchoLlm>, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let llm = Arc::new(EchoLlm::new());
        let config = AssistConfig::default();
        let flow = BookingFlowEngine::new(
            Arc::new(ConversationStateStore::new(Duration::from_secs(300))),
            Arc::new(KeywordClassifier::default_rules()),
            Arc::new(BaliSearch),
            Arc::new(SystemClock),
            BookingConfig::default(),
        );
        let assistant = Assistant::new(
            flow,
            ContextWindowManager::new(db.clone(), config.history_limit),
            Responder::new(llm.clone(), &config),
            db.clone(),
        );
        (assistant, llm, db)
    }

    fn request(scope: &ConversationScope, text: &str) -> AssistRequest {
        AssistRequest::new(scope.clone(), text, "Budi")
    }

    #[tokio::test]
    async fn general_message_goes_to_llm_and_is_recorded() {
        let (assistant, llm, db) = test_assistant().await;
        let scope = ConversationScope::direct("web:budi@example.com");

        let reply = assistant.handle(&request(&scope, "hello there")).await;
        assert_eq!(reply.source, ReplySource::Llm);
        assert_eq!(reply.text, "echo: hello there");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let turns = db.all_turns(&scope).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].content, "echo: hello there");
    }

    #[tokio::test]
    async fn booking_message_skips_llm_but_is_recorded() {
        let (assistant, llm, db) = test_assistant().await;
        let scope = ConversationScope::direct("web:budi@example.com");

        let reply = assistant.handle(&request(&scope, "I need a hotel in Bali")).await;
        assert_eq!(reply.source, ReplySource::BookingFlow);
        assert!(reply.text.contains("Bali, Indonesia"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.count_turns(&scope).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn window_excludes_the_current_message() {
        let (assistant, llm, _) = test_assistant().await;
        let scope = ConversationScope::direct("cli:local-user");

        assistant.handle(&request(&scope, "hello")).await;
        assistant.handle(&request(&scope, "how are you?")).await;

        let sizes = llm.history_sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![0, 2]);
    }

    #[tokio::test]
    async fn reset_clears_active_dialogue() {
        let (assistant, _, _) = test_assistant().await;
        let scope = ConversationScope::direct("web:budi@example.com");

        assistant.handle(&request(&scope, "I need a hotel in Bali")).await;
        assert!(assistant.flow.states().is_active(&scope));

        assistant.reset(&scope).await;
        assert!(!assistant.flow.states().is_active(&scope));
    }

    #[tokio::test]
    async fn group_message_touches_registry() {
        let (assistant, _, db) = test_assistant().await;
        let scope = ConversationScope::grouped("telegram:-100", "telegram:42");

        let req = request(&scope, "hello").with_group_name(Some("Bali Trip".into()));
        assistant.handle(&req).await;

        let group = db.get_group("telegram:-100").await.unwrap().unwrap();
        assert_eq!(group.name.as_deref(), Some("Bali Trip"));
        let participant = db.get_participant(&scope).await.unwrap().unwrap();
        assert_eq!(participant.display_name, "Budi");
    }

    #[tokio::test]
    async fn same_scope_messages_are_serialized() {
        let (assistant, _, db) = test_assistant().await;
        let assistant = Arc::new(assistant);
        let scope = ConversationScope::direct("web:budi@example.com");

        let mut handles = Vec::new();
        for i in 0..5 {
            let assistant = assistant.clone();
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                assistant.handle(&request(&scope, &format!("message {i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Each user turn is immediately followed by its own reply.
        let turns = db.all_turns(&scope).await.unwrap();
        assert_eq!(turns.len(), 10);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, TurnRole::User);
            assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
        }
    }
}
