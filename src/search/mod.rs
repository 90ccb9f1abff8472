//! Hotel search collaborator: location autocomplete, region search and
//! per-property room offers.
//!
//! The booking flow only talks to the [`HotelSearch`] trait; `http` holds the
//! production client.

pub mod http;

pub use http::HttpHotelSearch;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Date format exchanged with the provider.
pub const PROVIDER_DATE_FORMAT: &str = "%d-%m-%Y";

/// A resolved location: either a broad region or one specific property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationMatch {
    Region {
        region_id: String,
        name: String,
    },
    Property {
        property_id: String,
        name: String,
        star_rating: Option<u8>,
    },
}

impl LocationMatch {
    pub fn name(&self) -> &str {
        match self {
            Self::Region { name, .. } | Self::Property { name, .. } => name,
        }
    }

    pub fn is_region(&self) -> bool {
        matches!(self, Self::Region { .. })
    }
}

/// Guests per booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
}

impl Occupancy {
    pub fn adults_only(adults: u32) -> Self {
        Self {
            adults,
            children: 0,
            infants: 0,
        }
    }
}

/// Parameters for a region-wide search.
#[derive(Debug, Clone)]
pub struct RegionSearch {
    pub region_id: String,
    pub keyword: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub occupancy: Occupancy,
    pub rooms: u32,
    pub max_price_per_night: Decimal,
    pub page: u32,
    pub page_size: u32,
}

/// Parameters for a single-property room lookup.
#[derive(Debug, Clone)]
pub struct PropertySearch {
    pub property_id: String,
    pub keyword: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub occupancy: Occupancy,
    pub rooms: u32,
}

/// One property in a region result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelSummary {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub promo_price: Option<Decimal>,
    pub is_promo: bool,
    pub star_class: u8,
    pub review_score: Option<Decimal>,
    pub address: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl HotelSummary {
    /// Price the guest actually pays.
    pub fn effective_price(&self) -> Decimal {
        match (self.is_promo, self.promo_price) {
            (true, Some(promo)) => promo,
            _ => self.price,
        }
    }
}

/// Paging metadata reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMeta {
    pub total: u64,
    pub page: u32,
    pub max_page: u32,
}

/// Result of a region search, in provider ranking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionResults {
    pub hotels: Vec<HotelSummary>,
    pub meta: SearchMeta,
}

/// Property header returned alongside room offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetail {
    pub id: String,
    pub name: String,
    pub star_class: u8,
    pub review_score: Option<Decimal>,
    pub address: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A bookable room option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomOption {
    pub detail_id: String,
    pub room_type: String,
    pub price: Decimal,
    pub promo_price: Option<Decimal>,
    pub max_occupancy: u32,
    pub refundable: bool,
}

/// Room offers for one property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRooms {
    pub property: Option<PropertyDetail>,
    pub rooms: Vec<RoomOption>,
}

/// Structured payload returned to transports next to the rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchOutcome {
    Region(RegionResults),
    Property(PropertyRooms),
}

/// Hotel search provider.
#[async_trait]
pub trait HotelSearch: Send + Sync {
    /// Resolve free text to a region or a property. `Ok(None)` when nothing matches.
    async fn search_location(&self, query: &str) -> Result<Option<LocationMatch>, SearchError>;

    /// List properties in a region.
    async fn search_by_region(&self, request: &RegionSearch) -> Result<RegionResults, SearchError>;

    /// List room options of a single property.
    async fn search_property_rooms(
        &self,
        request: &PropertySearch,
    ) -> Result<PropertyRooms, SearchError>;
}

/// Google Maps search link for a coordinate pair.
pub fn maps_link(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps/search/?api=1&query={latitude},{longitude}")
}

/// Format a date the way the provider expects (`DD-MM-YYYY`).
pub fn provider_date(date: NaiveDate) -> String {
    date.format(PROVIDER_DATE_FORMAT).to_string()
}
