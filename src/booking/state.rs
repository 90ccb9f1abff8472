//! Dialogue state: which booking step a scope is on and the slots collected so far.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::search::{LocationMatch, Occupancy};

/// Steps of the booking dialogue.
///
/// Progresses linearly: AwaitingLocationConfirm → AwaitingCheckInDate →
/// AwaitingCheckOutDate → AwaitingGuestCount → AwaitingRoomCount →
/// AwaitingBudget. The budget step is skipped when the trigger message already
/// carried a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    AwaitingLocationConfirm,
    AwaitingCheckInDate,
    AwaitingCheckOutDate,
    AwaitingGuestCount,
    AwaitingRoomCount,
    AwaitingBudget,
}

impl std::fmt::Display for BookingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingLocationConfirm => "awaiting_location_confirm",
            Self::AwaitingCheckInDate => "awaiting_check_in_date",
            Self::AwaitingCheckOutDate => "awaiting_check_out_date",
            Self::AwaitingGuestCount => "awaiting_guest_count",
            Self::AwaitingRoomCount => "awaiting_room_count",
            Self::AwaitingBudget => "awaiting_budget",
        };
        write!(f, "{s}")
    }
}

/// Slots collected during one booking dialogue.
///
/// The location is known from the moment the dialogue exists; every other
/// field is filled once by its step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSlots {
    /// Location resolved from the trigger message.
    pub location: LocationMatch,
    /// Free-text phrase the location was resolved from.
    pub query: String,
    pub location_confirmed: bool,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub occupancy: Option<Occupancy>,
    pub rooms: Option<u32>,
    pub budget_per_night: Option<Decimal>,
}

impl BookingSlots {
    pub fn new(location: LocationMatch, query: impl Into<String>) -> Self {
        Self {
            location,
            query: query.into(),
            location_confirmed: false,
            check_in: None,
            check_out: None,
            occupancy: None,
            rooms: None,
            budget_per_night: None,
        }
    }

    pub fn with_budget(mut self, budget: Option<Decimal>) -> Self {
        self.budget_per_night = budget;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.location_confirmed = true;
        self
    }

    pub fn with_check_in(mut self, date: NaiveDate) -> Self {
        self.check_in = Some(date);
        self
    }

    pub fn with_check_out(mut self, date: NaiveDate) -> Self {
        self.check_out = Some(date);
        self
    }

    pub fn with_occupancy(mut self, occupancy: Occupancy) -> Self {
        self.occupancy = Some(occupancy);
        self
    }

    pub fn with_rooms(mut self, rooms: u32) -> Self {
        self.rooms = Some(rooms);
        self
    }

    /// Shallow-merge a patch: every field the patch sets overwrites ours.
    pub fn apply(&mut self, patch: SlotPatch) {
        if let Some(confirmed) = patch.location_confirmed {
            self.location_confirmed = confirmed;
        }
        if let Some(date) = patch.check_in {
            self.check_in = Some(date);
        }
        if let Some(date) = patch.check_out {
            self.check_out = Some(date);
        }
        if let Some(occupancy) = patch.occupancy {
            self.occupancy = Some(occupancy);
        }
        if let Some(rooms) = patch.rooms {
            self.rooms = Some(rooms);
        }
        if let Some(budget) = patch.budget_per_night {
            self.budget_per_night = budget;
        }
    }

    /// Everything a search needs, or `None` if a required slot is missing.
    pub fn ready(&self) -> Option<ReadySearch> {
        if !self.location_confirmed {
            return None;
        }
        let check_in = self.check_in?;
        let check_out = self.check_out?;
        if check_out <= check_in {
            return None;
        }
        Some(ReadySearch {
            location: self.location.clone(),
            check_in,
            check_out,
            occupancy: self.occupancy?,
            rooms: self.rooms?,
            budget_per_night: self.budget_per_night,
        })
    }
}

/// Partial slot update for [`ConversationStateStore::merge`](super::ConversationStateStore::merge).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotPatch {
    pub location_confirmed: Option<bool>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub occupancy: Option<Occupancy>,
    pub rooms: Option<u32>,
    /// `Some(None)` clears the budget.
    pub budget_per_night: Option<Option<Decimal>>,
}

/// Complete, validated slot set handed to the search step.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadySearch {
    pub location: LocationMatch,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub occupancy: Occupancy,
    pub rooms: u32,
    pub budget_per_night: Option<Decimal>,
}

/// One active booking dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    pub step: BookingStep,
    pub slots: BookingSlots,
    pub last_updated_at: DateTime<Utc>,
}
