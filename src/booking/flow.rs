//! Booking flow engine: drives one scope through slot filling and runs the
//! search once every slot is known.
//!
//! Step handling is split in two. [`evaluate`] is a pure function from the
//! current state and the classified message to a [`StepOutcome`];
//! [`BookingFlowEngine::handle`] applies that outcome to the state store and
//! performs the only suspension points (location lookup and search).

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::booking::dates::parse_date;
use crate::booking::intent::{GeneralKind, IntentClassifier, IntentSignal};
use crate::booking::render;
use crate::booking::state::{BookingSlots, BookingStep, DialogueState, ReadySearch, SlotPatch};
use crate::booking::store::ConversationStateStore;
use crate::clock::Clock;
use crate::config::BookingConfig;
use crate::scope::ConversationScope;
use crate::search::{
    HotelSearch, LocationMatch, Occupancy, PropertySearch, RegionSearch, SearchOutcome,
};

/// Whole answer: `adults[-children[-infants]]`, optionally followed by words
/// such as "adults" or "orang".
static GUESTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})(?:\s*-\s*(\d{1,2}))?(?:\s*-\s*(\d{1,2}))?(?:\s+[\p{L}\s]*)?$")
        .unwrap()
});
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\b").unwrap());

const YES: &[&str] = &[
    "ya", "yes", "iya", "betul", "benar", "y", "yep", "yup", "sure", "ok", "okay", "correct",
];
const NO: &[&str] = &["tidak", "no", "bukan", "n", "nope", "nggak", "gak", "enggak"];
const SKIP: &[&str] = &[
    "skip", "tidak", "no", "none", "lewati", "gak", "nggak", "any", "no budget",
];

/// Reply produced by the flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResponse {
    pub text: String,
    /// Structured results when the turn ran a search.
    pub search: Option<SearchOutcome>,
}

impl FlowResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            search: None,
        }
    }
}

/// Whether the flow consumed the message.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Handled(FlowResponse),
    /// Not a booking message; the caller should take the general path.
    NotHandled,
}

impl FlowOutcome {
    fn reply(text: impl Into<String>) -> Self {
        Self::Handled(FlowResponse::text(text))
    }
}

/// Result of evaluating one answer against the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Valid answer; store `patch` and move to `step`.
    Advance {
        step: BookingStep,
        patch: SlotPatch,
        reply: String,
    },
    /// Not a valid answer; state stays as it is.
    Reprompt(String),
    /// Drop the dialogue and reply.
    Abandon(String),
    /// Last slot filled; store `patch` and search.
    Search(SlotPatch),
}

/// Decide what an answer means for the current step. Pure.
pub fn evaluate(state: &DialogueState, signal: &IntentSignal, text: &str, today: NaiveDate) -> StepOutcome {
    let slots = &state.slots;
    match state.step {
        BookingStep::AwaitingLocationConfirm => {
            let answer = short_answer(text);
            if NO.contains(&answer.as_str()) {
                StepOutcome::Abandon(render::location_rejected())
            } else if YES.contains(&answer.as_str()) {
                StepOutcome::Advance {
                    step: BookingStep::AwaitingCheckInDate,
                    patch: SlotPatch {
                        location_confirmed: Some(true),
                        ..Default::default()
                    },
                    reply: render::ask_check_in(),
                }
            } else {
                StepOutcome::Reprompt(render::ask_yes_no())
            }
        }

        BookingStep::AwaitingCheckInDate => match parse_date(text, today) {
            Some(date) => StepOutcome::Advance {
                step: BookingStep::AwaitingCheckOutDate,
                patch: SlotPatch {
                    check_in: Some(date),
                    ..Default::default()
                },
                reply: render::ask_check_out(date),
            },
            None => StepOutcome::Reprompt(render::invalid_check_in()),
        },

        BookingStep::AwaitingCheckOutDate => {
            let Some(check_in) = slots.check_in else {
                return StepOutcome::Abandon(render::flow_reset());
            };
            match parse_date(text, today) {
                None => StepOutcome::Reprompt(render::invalid_check_out()),
                Some(date) if date <= check_in => {
                    StepOutcome::Reprompt(render::check_out_not_after(check_in))
                }
                Some(date) => StepOutcome::Advance {
                    step: BookingStep::AwaitingGuestCount,
                    patch: SlotPatch {
                        check_out: Some(date),
                        ..Default::default()
                    },
                    reply: render::ask_guests(date),
                },
            }
        }

        BookingStep::AwaitingGuestCount => match parse_guests(text) {
            Some(occupancy) if occupancy.adults >= 1 => StepOutcome::Advance {
                step: BookingStep::AwaitingRoomCount,
                patch: SlotPatch {
                    occupancy: Some(occupancy),
                    ..Default::default()
                },
                reply: render::ask_rooms(&occupancy),
            },
            Some(_) => StepOutcome::Reprompt(render::at_least_one_adult()),
            None => StepOutcome::Reprompt(render::invalid_guests()),
        },

        BookingStep::AwaitingRoomCount => {
            let Some(rooms) = parse_rooms(text) else {
                return StepOutcome::Reprompt(render::invalid_rooms());
            };
            let patch = SlotPatch {
                rooms: Some(rooms),
                ..Default::default()
            };
            if slots.budget_per_night.is_some() {
                StepOutcome::Search(patch)
            } else {
                StepOutcome::Advance {
                    step: BookingStep::AwaitingBudget,
                    patch,
                    reply: render::ask_budget(rooms),
                }
            }
        }

        BookingStep::AwaitingBudget => {
            if SKIP.contains(&short_answer(text).as_str()) {
                StepOutcome::Search(SlotPatch {
                    budget_per_night: Some(None),
                    ..Default::default()
                })
            } else if let Some(budget) = signal.budget {
                StepOutcome::Search(SlotPatch {
                    budget_per_night: Some(Some(budget)),
                    ..Default::default()
                })
            } else {
                StepOutcome::Reprompt(render::invalid_budget())
            }
        }
    }
}

/// `adults[-children[-infants]]`; missing counts default to zero.
pub fn parse_guests(text: &str) -> Option<Occupancy> {
    let caps = GUESTS.captures(text)?;
    let count = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Occupancy {
        adults: count(1)?,
        children: count(2)?,
        infants: count(3)?,
    })
}

/// Leading positive integer.
pub fn parse_rooms(text: &str) -> Option<u32> {
    let caps = LEADING_INT.captures(text)?;
    caps[1].parse().ok().filter(|n| *n >= 1)
}

fn short_answer(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

/// Process-wide booking flow.
pub struct BookingFlowEngine {
    states: Arc<ConversationStateStore>,
    classifier: Arc<dyn IntentClassifier>,
    search: Arc<dyn HotelSearch>,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
}

impl BookingFlowEngine {
    pub fn new(
        states: Arc<ConversationStateStore>,
        classifier: Arc<dyn IntentClassifier>,
        search: Arc<dyn HotelSearch>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            states,
            classifier,
            search,
            clock,
            config,
        }
    }

    pub fn states(&self) -> &Arc<ConversationStateStore> {
        &self.states
    }

    /// Handle one message for `scope`.
    ///
    /// Callers must not run two `handle` calls for the same scope at once.
    pub async fn handle(
        &self,
        scope: &ConversationScope,
        text: &str,
        display_name: &str,
    ) -> FlowOutcome {
        let signal = self.classifier.classify(text);

        let Some(state) = self.states.get(scope) else {
            return self.start(scope, display_name, &signal).await;
        };

        if signal.cancel {
            info!(scope = %scope, step = %state.step, "Booking cancelled by user");
            self.states.clear(scope);
            return FlowOutcome::reply(render::cancelled());
        }

        let outcome = evaluate(&state, &signal, text, self.clock.today());

        if signal.is_general_question() && matches!(outcome, StepOutcome::Reprompt(_)) {
            info!(scope = %scope, step = %state.step, "General question mid-booking, leaving flow");
            self.states.clear(scope);
            return FlowOutcome::NotHandled;
        }

        match outcome {
            StepOutcome::Advance { step, patch, reply } => {
                if self.states.advance(scope, step, patch) {
                    FlowOutcome::reply(reply)
                } else {
                    // Expired between the read and the write.
                    FlowOutcome::reply(render::flow_reset())
                }
            }
            StepOutcome::Reprompt(reply) => {
                debug!(scope = %scope, step = %state.step, "Answer rejected, re-prompting");
                FlowOutcome::reply(reply)
            }
            StepOutcome::Abandon(reply) => {
                self.states.clear(scope);
                FlowOutcome::reply(reply)
            }
            StepOutcome::Search(patch) => {
                self.states.clear(scope);
                let mut slots = state.slots;
                slots.apply(patch);
                match slots.ready() {
                    Some(ready) => FlowOutcome::Handled(self.perform_search(&ready).await),
                    None => {
                        warn!(scope = %scope, "Search step reached with incomplete slots");
                        FlowOutcome::reply(render::flow_reset())
                    }
                }
            }
        }
    }

    /// No dialogue yet: start one if this is a booking request with a place.
    async fn start(
        &self,
        scope: &ConversationScope,
        display_name: &str,
        signal: &IntentSignal,
    ) -> FlowOutcome {
        if !signal.booking_trigger || signal.cancel || signal.general == Some(GeneralKind::Question)
        {
            return FlowOutcome::NotHandled;
        }

        let Some(query) = signal.location_phrase.clone() else {
            return FlowOutcome::reply(render::ask_for_location());
        };

        info!(scope = %scope, user = display_name, query = %query, "Booking request detected");
        let location = match self.search.search_location(&query).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                self.states.clear(scope);
                return FlowOutcome::reply(render::location_not_found(&query));
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Location lookup failed");
                return FlowOutcome::reply(render::search_failed());
            }
        };

        let reply = render::location_found(&location);
        let slots = BookingSlots::new(location, query).with_budget(signal.budget);
        self.states
            .set(scope, BookingStep::AwaitingLocationConfirm, slots);
        FlowOutcome::reply(reply)
    }

    /// Terminal step. State is already cleared; failures become an apology.
    async fn perform_search(&self, ready: &ReadySearch) -> FlowResponse {
        info!(
            location = ready.location.name(),
            check_in = %ready.check_in,
            check_out = %ready.check_out,
            rooms = ready.rooms,
            budget = %render::budget_label(ready.budget_per_night),
            "Running hotel search"
        );

        match &ready.location {
            LocationMatch::Region { region_id, name } => {
                let request = RegionSearch {
                    region_id: region_id.clone(),
                    keyword: name.clone(),
                    date_from: ready.check_in,
                    date_to: ready.check_out,
                    occupancy: ready.occupancy,
                    rooms: ready.rooms,
                    max_price_per_night: ready
                        .budget_per_night
                        .unwrap_or(self.config.default_max_price),
                    page: 1,
                    page_size: self.config.page_size,
                };
                match self.search.search_by_region(&request).await {
                    Ok(results) if results.hotels.is_empty() => {
                        FlowResponse::text(render::nothing_in_region(name))
                    }
                    Ok(results) => FlowResponse {
                        text: render::region_results(ready, &results, &self.config),
                        search: Some(SearchOutcome::Region(results)),
                    },
                    Err(e) => {
                        warn!(region_id = %region_id, error = %e, "Region search failed");
                        FlowResponse::text(render::search_failed())
                    }
                }
            }
            LocationMatch::Property {
                property_id, name, ..
            } => {
                let request = PropertySearch {
                    property_id: property_id.clone(),
                    keyword: name.clone(),
                    date_from: ready.check_in,
                    date_to: ready.check_out,
                    occupancy: ready.occupancy,
                    rooms: ready.rooms,
                };
                match self.search.search_property_rooms(&request).await {
                    Ok(rooms) if rooms.property.is_none() || rooms.rooms.is_empty() => {
                        FlowResponse::text(render::property_unavailable(name))
                    }
                    Ok(rooms) => FlowResponse {
                        text: render::property_rooms(ready, &rooms, &self.config),
                        search: Some(SearchOutcome::Property(rooms)),
                    },
                    Err(e) => {
                        warn!(property_id = %property_id, error = %e, "Room lookup failed");
                        FlowResponse::text(render::search_failed())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::booking::intent::KeywordClassifier;
    use crate::clock::ManualClock;
    use crate::error::SearchError;
    use crate::search::{
        HotelSummary, PropertyDetail, PropertyRooms, RegionResults, RoomOption, SearchMeta,
    };

    // ── Stub search provider ────────────────────────────────────────────

    #[derive(Default)]
    struct StubSearch {
        location: Option<LocationMatch>,
        hotels: Vec<HotelSummary>,
        rooms: PropertyRooms,
        fail_search: bool,
        fail_location: bool,
        location_calls: AtomicUsize,
        region_requests: Mutex<Vec<RegionSearch>>,
        property_requests: Mutex<Vec<PropertySearch>>,
    }

    #[async_trait]
    impl HotelSearch for StubSearch {
        async fn search_location(
            &self,
            _query: &str,
        ) -> Result<Option<LocationMatch>, SearchError> {
            self.location_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_location {
                return Err(SearchError::Status {
                    endpoint: "autocomplete".into(),
                    status: 502,
                });
            }
            Ok(self.location.clone())
        }

        async fn search_by_region(
            &self,
            request: &RegionSearch,
        ) -> Result<RegionResults, SearchError> {
            self.region_requests.lock().unwrap().push(request.clone());
            if self.fail_search {
                return Err(SearchError::RequestFailed {
                    endpoint: "search".into(),
                    reason: "connection reset".into(),
                });
            }
            Ok(RegionResults {
                hotels: self.hotels.clone(),
                meta: SearchMeta::default(),
            })
        }

        async fn search_property_rooms(
            &self,
            request: &PropertySearch,
        ) -> Result<PropertyRooms, SearchError> {
            self.property_requests.lock().unwrap().push(request.clone());
            if self.fail_search {
                return Err(SearchError::Status {
                    endpoint: "offerdetail".into(),
                    status: 500,
                });
            }
            Ok(self.rooms.clone())
        }
    }

    fn jakarta() -> LocationMatch {
        LocationMatch::Region {
            region_id: "G-10".into(),
            name: "Jakarta".into(),
        }
    }

    fn hotel(name: &str) -> HotelSummary {
        HotelSummary {
            id: name.to_lowercase(),
            name: name.into(),
            price: dec!(750000),
            promo_price: None,
            is_promo: false,
            star_class: 4,
            review_score: None,
            address: "Jl. Thamrin".into(),
            city: "Jakarta".into(),
            latitude: None,
            longitude: None,
        }
    }

    struct Harness {
        engine: BookingFlowEngine,
        search: Arc<StubSearch>,
        clock: Arc<ManualClock>,
    }

    fn harness(search: StubSearch) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        clock.set_today(NaiveDate::from_ymd_opt(2025, 11, 15).unwrap());
        let states = Arc::new(ConversationStateStore::with_clock(
            Duration::from_secs(300),
            clock.clone(),
        ));
        let search = Arc::new(search);
        let engine = BookingFlowEngine::new(
            states,
            Arc::new(KeywordClassifier::default_rules()),
            search.clone(),
            clock.clone(),
            BookingConfig::default(),
        );
        Harness {
            engine,
            search,
            clock,
        }
    }

    fn region_harness() -> Harness {
        harness(StubSearch {
            location: Some(jakarta()),
            hotels: vec![hotel("Hotel Indonesia"), hotel("Grand Hyatt")],
            ..Default::default()
        })
    }

    fn step(h: &Harness, scope: &ConversationScope) -> Option<BookingStep> {
        h.engine.states().get(scope).map(|s| s.step)
    }

    async fn say(h: &Harness, scope: &ConversationScope, text: &str) -> FlowOutcome {
        h.engine.handle(scope, text, "Tester").await
    }

    fn handled_text(outcome: FlowOutcome) -> String {
        match outcome {
            FlowOutcome::Handled(r) => r.text,
            FlowOutcome::NotHandled => panic!("expected the flow to handle the message"),
        }
    }

    /// Drive a fresh scope up to the given step.
    async fn drive_to(h: &Harness, scope: &ConversationScope, target: BookingStep) {
        let script = [
            ("I want to stay in Jakarta", BookingStep::AwaitingLocationConfirm),
            ("yes", BookingStep::AwaitingCheckInDate),
            ("16-11-2025", BookingStep::AwaitingCheckOutDate),
            ("17-11-2025", BookingStep::AwaitingGuestCount),
            ("2", BookingStep::AwaitingRoomCount),
            ("1", BookingStep::AwaitingBudget),
        ];
        for (text, reached) in script {
            say(h, scope, text).await;
            assert_eq!(step(h, scope), Some(reached));
            if reached == target {
                return;
            }
        }
    }

    // ── Full scenario ───────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_without_budget() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");

        let reply = handled_text(say(&h, &scope, "I want to stay in Jakarta").await);
        assert!(reply.contains("Jakarta"));
        let state = h.engine.states().get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingLocationConfirm);
        assert_eq!(state.slots.location.name(), "Jakarta");
        assert_eq!(state.slots.budget_per_night, None);

        say(&h, &scope, "yes").await;
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingCheckInDate));

        say(&h, &scope, "16-11-2025").await;
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingCheckOutDate));

        say(&h, &scope, "17-11-2025").await;
        let state = h.engine.states().get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingGuestCount);
        assert_eq!(state.slots.check_in, NaiveDate::from_ymd_opt(2025, 11, 16));
        assert_eq!(state.slots.check_out, NaiveDate::from_ymd_opt(2025, 11, 17));

        say(&h, &scope, "2").await;
        let state = h.engine.states().get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingRoomCount);
        assert_eq!(
            state.slots.occupancy,
            Some(Occupancy {
                adults: 2,
                children: 0,
                infants: 0
            })
        );

        say(&h, &scope, "1").await;
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingBudget));

        let outcome = say(&h, &scope, "skip").await;
        let FlowOutcome::Handled(response) = outcome else {
            panic!("search turn must be handled");
        };
        assert!(response.text.contains("Hotel Indonesia"));
        assert!(matches!(response.search, Some(SearchOutcome::Region(_))));
        assert!(!h.engine.states().is_active(&scope));

        let requests = h.search.region_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_price_per_night, dec!(20000000));
        assert_eq!(requests[0].occupancy.adults, 2);
        assert_eq!(requests[0].rooms, 1);
    }

    #[tokio::test]
    async fn budget_in_trigger_skips_budget_step() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        say(&h, &scope, "cari hotel di Jakarta budget 500rb").await;
        assert_eq!(
            h.engine.states().get(&scope).unwrap().slots.budget_per_night,
            Some(dec!(500000))
        );
        for answer in ["ya", "16-11-2025", "18-11-2025", "2-1-0"] {
            say(&h, &scope, answer).await;
        }
        let outcome = say(&h, &scope, "1").await;
        assert!(matches!(outcome, FlowOutcome::Handled(FlowResponse { search: Some(_), .. })));
        assert!(!h.engine.states().is_active(&scope));
        let requests = h.search.region_requests.lock().unwrap();
        assert_eq!(requests[0].max_price_per_night, dec!(500000));
        assert_eq!(requests[0].occupancy.children, 1);
    }

    #[tokio::test]
    async fn budget_answer_is_used() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingBudget).await;
        say(&h, &scope, "1.5jt").await;
        let requests = h.search.region_requests.lock().unwrap();
        assert_eq!(requests[0].max_price_per_night, dec!(1500000));
    }

    // ── Re-prompts keep state ───────────────────────────────────────────

    #[tokio::test]
    async fn check_out_must_follow_check_in() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingCheckOutDate).await;
        let before = h.engine.states().get(&scope).unwrap();

        for same_or_earlier in ["16-11-2025", "10-11-2025"] {
            let reply = handled_text(say(&h, &scope, same_or_earlier).await);
            assert!(reply.contains("after check-in"));
            let after = h.engine.states().get(&scope).unwrap();
            assert_eq!(after.step, BookingStep::AwaitingCheckOutDate);
            assert_eq!(after.slots, before.slots);
        }
    }

    #[tokio::test]
    async fn invalid_answers_reprompt() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");

        drive_to(&h, &scope, BookingStep::AwaitingLocationConfirm).await;
        let reply = handled_text(say(&h, &scope, "maybe").await);
        assert!(reply.contains("Yes or No"));
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingLocationConfirm));

        say(&h, &scope, "yes").await;
        handled_text(say(&h, &scope, "soon-ish").await);
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingCheckInDate));

        say(&h, &scope, "16-11-2025").await;
        say(&h, &scope, "17-11-2025").await;
        let reply = handled_text(say(&h, &scope, "0-2").await);
        assert!(reply.contains("At least 1 adult"));
        handled_text(say(&h, &scope, "a few").await);
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingGuestCount));

        say(&h, &scope, "2").await;
        handled_text(say(&h, &scope, "0").await);
        handled_text(say(&h, &scope, "-1").await);
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingRoomCount));

        say(&h, &scope, "1").await;
        handled_text(say(&h, &scope, "cheap-ish").await);
        assert_eq!(step(&h, &scope), Some(BookingStep::AwaitingBudget));
    }

    #[tokio::test]
    async fn negative_confirmation_clears_state() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingLocationConfirm).await;
        let reply = handled_text(say(&h, &scope, "No").await);
        assert!(reply.contains("right location"));
        assert!(!h.engine.states().is_active(&scope));
    }

    // ── Exits ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancel_at_every_step_clears_state() {
        let steps = [
            BookingStep::AwaitingLocationConfirm,
            BookingStep::AwaitingCheckInDate,
            BookingStep::AwaitingCheckOutDate,
            BookingStep::AwaitingGuestCount,
            BookingStep::AwaitingRoomCount,
            BookingStep::AwaitingBudget,
        ];
        for target in steps {
            let h = region_harness();
            let scope = ConversationScope::direct("u1");
            drive_to(&h, &scope, target).await;
            let reply = handled_text(say(&h, &scope, "cancel").await);
            assert!(reply.contains("cancelled"), "at {target}");
            assert!(!h.engine.states().is_active(&scope));

            // Next message is stateless again.
            assert_eq!(say(&h, &scope, "17-11-2025").await, FlowOutcome::NotHandled);
        }
    }

    #[tokio::test]
    async fn general_question_mid_flow_falls_through() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingCheckInDate).await;
        let outcome = say(&h, &scope, "what services do you offer").await;
        assert_eq!(outcome, FlowOutcome::NotHandled);
        assert!(!h.engine.states().is_active(&scope));
    }

    #[tokio::test]
    async fn valid_answer_wins_over_question_shape() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingCheckInDate).await;
        say(&h, &scope, "how about tomorrow").await;
        let state = h.engine.states().get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingCheckOutDate);
        assert_eq!(state.slots.check_in, NaiveDate::from_ymd_opt(2025, 11, 16));
    }

    #[tokio::test]
    async fn expired_state_starts_over() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingCheckInDate).await;
        h.clock.advance(chrono::Duration::minutes(6));
        assert_eq!(say(&h, &scope, "16-11-2025").await, FlowOutcome::NotHandled);
        assert!(!h.engine.states().is_active(&scope));
    }

    // ── Starting a flow ─────────────────────────────────────────────────

    #[tokio::test]
    async fn non_booking_messages_are_not_handled() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        assert_eq!(say(&h, &scope, "tell me a joke").await, FlowOutcome::NotHandled);
        assert_eq!(
            say(&h, &scope, "what is a staycation?").await,
            FlowOutcome::NotHandled
        );
        assert_eq!(h.search.location_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn trigger_without_place_asks_for_one() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        let reply = handled_text(say(&h, &scope, "cari hotel").await);
        assert!(reply.contains("Which city"));
        assert!(!h.engine.states().is_active(&scope));
        assert_eq!(h.search.location_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_location_creates_no_state() {
        let h = harness(StubSearch::default());
        let scope = ConversationScope::direct("u1");
        let reply = handled_text(say(&h, &scope, "hotel in Atlantis").await);
        assert!(reply.contains("Atlantis"));
        assert!(!h.engine.states().is_active(&scope));
    }

    #[tokio::test]
    async fn location_lookup_failure_apologizes() {
        let h = harness(StubSearch {
            fail_location: true,
            ..Default::default()
        });
        let scope = ConversationScope::direct("u1");
        let reply = handled_text(say(&h, &scope, "hotel in Bali").await);
        assert!(reply.contains("Sorry"));
        assert!(!h.engine.states().is_active(&scope));
    }

    // ── Terminal search ─────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_results_say_nothing_available() {
        let h = harness(StubSearch {
            location: Some(jakarta()),
            ..Default::default()
        });
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingBudget).await;
        let FlowOutcome::Handled(response) = say(&h, &scope, "skip").await else {
            panic!("expected handled");
        };
        assert!(response.text.contains("no hotels available in Jakarta"));
        assert!(response.search.is_none());
        assert!(!h.engine.states().is_active(&scope));
    }

    #[tokio::test]
    async fn provider_failure_apologizes_and_clears() {
        let h = harness(StubSearch {
            location: Some(jakarta()),
            fail_search: true,
            ..Default::default()
        });
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingBudget).await;
        let reply = handled_text(say(&h, &scope, "500k").await);
        assert!(reply.contains("couldn't reach"));
        assert!(!h.engine.states().is_active(&scope));
    }

    #[tokio::test]
    async fn property_location_lists_rooms() {
        let rooms = PropertyRooms {
            property: Some(PropertyDetail {
                id: "P-77".into(),
                name: "The Mulia".into(),
                star_class: 5,
                review_score: None,
                address: "Senayan".into(),
                city: "Jakarta".into(),
                latitude: Some(-6.22),
                longitude: Some(106.8),
            }),
            rooms: vec![RoomOption {
                detail_id: "d1".into(),
                room_type: "Grandeur".into(),
                price: dec!(3200000),
                promo_price: None,
                max_occupancy: 2,
                refundable: true,
            }],
        };
        let h = harness(StubSearch {
            location: Some(LocationMatch::Property {
                property_id: "P-77".into(),
                name: "The Mulia".into(),
                star_rating: Some(5),
            }),
            rooms,
            ..Default::default()
        });
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingBudget).await;
        let FlowOutcome::Handled(response) = say(&h, &scope, "skip").await else {
            panic!("expected handled");
        };
        assert!(response.text.contains("Grandeur"));
        assert!(matches!(response.search, Some(SearchOutcome::Property(_))));
        assert_eq!(h.search.property_requests.lock().unwrap()[0].property_id, "P-77");
    }

    // ── Isolation ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn scopes_do_not_share_dialogues() {
        let h = region_harness();
        let direct = ConversationScope::direct("u1");
        let grouped = ConversationScope::grouped("g1", "u1");
        drive_to(&h, &direct, BookingStep::AwaitingCheckInDate).await;
        assert_eq!(say(&h, &grouped, "16-11-2025").await, FlowOutcome::NotHandled);
        assert_eq!(step(&h, &direct), Some(BookingStep::AwaitingCheckInDate));
    }

    // ── Pure helpers ────────────────────────────────────────────────────

    #[test]
    fn guest_pattern() {
        assert_eq!(parse_guests("2"), Some(Occupancy::adults_only(2)));
        assert_eq!(
            parse_guests("2-1-1"),
            Some(Occupancy {
                adults: 2,
                children: 1,
                infants: 1
            })
        );
        assert_eq!(
            parse_guests("3 - 2"),
            Some(Occupancy {
                adults: 3,
                children: 2,
                infants: 0
            })
        );
        assert_eq!(parse_guests("0").map(|o| o.adults), Some(0));
        assert_eq!(parse_guests("two"), None);
    }

    #[test]
    fn guests_must_be_the_whole_answer() {
        assert_eq!(parse_guests("2 adults"), Some(Occupancy::adults_only(2)));
        assert_eq!(parse_guests("17-11-2025"), None);
        assert_eq!(parse_guests("what is 2+2"), None);
        assert_eq!(parse_guests("2 adults and 3 kids"), None);
    }

    #[tokio::test]
    async fn date_at_guest_step_is_reprompted() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingGuestCount).await;
        let reply = handled_text(say(&h, &scope, "17-11-2025").await);
        assert!(reply.contains("How many guests"));
        let state = h.engine.states().get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingGuestCount);
        assert_eq!(state.slots.occupancy, None);
    }

    #[tokio::test]
    async fn question_at_guest_step_falls_through() {
        let h = region_harness();
        let scope = ConversationScope::direct("u1");
        drive_to(&h, &scope, BookingStep::AwaitingGuestCount).await;
        assert_eq!(say(&h, &scope, "what is 2+2").await, FlowOutcome::NotHandled);
        assert!(!h.engine.states().is_active(&scope));
    }

    #[test]
    fn room_pattern() {
        assert_eq!(parse_rooms("2"), Some(2));
        assert_eq!(parse_rooms(" 3 rooms"), Some(3));
        assert_eq!(parse_rooms("0"), None);
        assert_eq!(parse_rooms("-1"), None);
        assert_eq!(parse_rooms("one"), None);
    }

    #[test]
    fn evaluate_is_pure_for_budget_step() {
        let state = DialogueState {
            step: BookingStep::AwaitingBudget,
            slots: BookingSlots::new(jakarta(), "jakarta"),
            last_updated_at: Utc::now(),
        };
        let today = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        let signal = IntentSignal {
            budget: Some(dec!(800000)),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&state, &signal, "800rb", today),
            StepOutcome::Search(SlotPatch {
                budget_per_night: Some(Some(dec!(800000))),
                ..Default::default()
            })
        );
        assert_eq!(
            evaluate(&state, &IntentSignal::default(), "Skip!", today),
            StepOutcome::Search(SlotPatch {
                budget_per_night: Some(None::<Decimal>),
                ..Default::default()
            })
        );
    }
}
