//! HTTP client for the hotel provider's booking API.
//!
//! Response parsing is split into pure functions over `serde_json::Value` so it
//! can be tested without a network.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::search::{
    HotelSearch, HotelSummary, LocationMatch, PropertyDetail, PropertyRooms, PropertySearch,
    RegionResults, RegionSearch, RoomOption, SearchMeta, provider_date,
};

const AUTOCOMPLETE: &str = "booking/autocomplete";
const REGION_SEARCH: &str = "apitrav/booking/search";
const OFFER_DETAIL: &str = "apitrav/booking/offerdetail";

/// [`HotelSearch`] over the provider's JSON API.
pub struct HttpHotelSearch {
    base_url: String,
    client: reqwest::Client,
}

impl HttpHotelSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::RequestFailed {
                endpoint: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn read_json(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<Value, SearchError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| SearchError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, SearchError> {
        let resp = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Self::read_json(endpoint, resp).await
    }
}

#[async_trait]
impl HotelSearch for HttpHotelSearch {
    async fn search_location(&self, query: &str) -> Result<Option<LocationMatch>, SearchError> {
        debug!(query, "Searching location");
        let resp = self
            .client
            .get(self.url(AUTOCOMPLETE))
            .query(&[("product", "hotel"), ("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed {
                endpoint: AUTOCOMPLETE.to_string(),
                reason: e.to_string(),
            })?;
        let body = Self::read_json(AUTOCOMPLETE, resp).await?;
        let found = parse_location(&body);
        match &found {
            Some(location) => info!(
                query,
                name = location.name(),
                region = location.is_region(),
                "Location resolved"
            ),
            None => info!(query, "No location match"),
        }
        Ok(found)
    }

    async fn search_by_region(&self, request: &RegionSearch) -> Result<RegionResults, SearchError> {
        let body = region_search_body(request);
        let results = parse_region_results(&self.post(REGION_SEARCH, &body).await?);
        info!(
            region_id = %request.region_id,
            count = results.hotels.len(),
            total = results.meta.total,
            "Region search complete"
        );
        Ok(results)
    }

    async fn search_property_rooms(
        &self,
        request: &PropertySearch,
    ) -> Result<PropertyRooms, SearchError> {
        let body = offer_detail_body(request);
        let rooms = parse_property_rooms(&self.post(OFFER_DETAIL, &body).await?);
        info!(
            property_id = %request.property_id,
            rooms = rooms.rooms.len(),
            "Property room lookup complete"
        );
        Ok(rooms)
    }
}

// ── Request bodies ──────────────────────────────────────────────────

fn pax(occupancy: &crate::search::Occupancy, rooms: u32) -> Value {
    json!({
        "room": rooms.to_string(),
        "adult": occupancy.adults.to_string(),
        "child": occupancy.children.to_string(),
        "infant": occupancy.infants.to_string(),
        "childAge": [],
    })
}

fn region_search_body(request: &RegionSearch) -> Value {
    json!({
        "product": "hotel",
        "adult": request.occupancy.adults.to_string(),
        "child": request.occupancy.children.to_string(),
        "infant": request.occupancy.infants.to_string(),
        "keyword": request.keyword,
        "from": request.region_id,
        "dateFrom": provider_date(request.date_from),
        "dateTo": provider_date(request.date_to),
        "room": request.rooms.to_string(),
        "childAge": [],
        "classFrom": "0",
        "classTo": "5",
        "showDetail": false,
        "pax": pax(&request.occupancy, request.rooms),
        "filter": {
            "search": "",
            "page": request.page,
            "limit": request.page_size,
            "orderType": "",
            "priceFrom": 0,
            "priceTo": request.max_price_per_night.trunc().to_u64().unwrap_or(u64::MAX),
            "class": [],
            "recomendedOnly": false,
            "reviews": [],
        },
    })
}

fn offer_detail_body(request: &PropertySearch) -> Value {
    json!({
        "product": "hotel",
        "from": request.property_id,
        "productId": request.property_id,
        "productDetail": request.property_id,
        "adult": request.occupancy.adults.to_string(),
        "child": request.occupancy.children.to_string(),
        "infant": request.occupancy.infants.to_string(),
        "keyword": request.keyword,
        "dateFrom": provider_date(request.date_from),
        "dateTo": provider_date(request.date_to),
        "room": request.rooms.to_string(),
        "childAge": [],
        "classFrom": "0",
        "classTo": "5",
        "showDetail": false,
        "pax": pax(&request.occupancy, request.rooms),
    })
}

// ── Response parsing ────────────────────────────────────────────────

/// Prefer the first entry carrying a region id; otherwise take the first
/// entry as a property.
pub fn parse_location(body: &Value) -> Option<LocationMatch> {
    let items = body.get("data")?.as_array()?;

    if let Some(region) = items.iter().find(|item| text(item, "geoid").is_some()) {
        return Some(LocationMatch::Region {
            region_id: text(region, "geoid")?,
            name: display_name(region)?,
        });
    }

    let first = items.first()?;
    Some(LocationMatch::Property {
        property_id: text(first, "productId").or_else(|| text(first, "id"))?,
        name: display_name(first)?,
        star_rating: star_class(first.get("starRating")).filter(|s| *s > 0),
    })
}

/// Empty results when the provider reports failure or omits the list.
pub fn parse_region_results(body: &Value) -> RegionResults {
    let Some(options) = succeeded(body)
        .and_then(|data| data.get("productOptions"))
        .and_then(Value::as_array)
    else {
        return RegionResults::default();
    };

    let hotels = options
        .iter()
        .filter_map(|hotel| {
            let detail = hotel.get("detail");
            Some(HotelSummary {
                id: text(hotel, "id")?,
                name: text(hotel, "name")?,
                price: decimal(hotel.get("price")).unwrap_or_default(),
                promo_price: decimal(hotel.get("promoPrice")),
                is_promo: hotel.get("isPromo").and_then(Value::as_bool).unwrap_or(false),
                star_class: star_class(hotel.get("class")).unwrap_or(0),
                review_score: decimal(hotel.get("reviewScore")),
                address: detail.and_then(|d| text(d, "address")).unwrap_or_default(),
                city: detail.and_then(|d| text(d, "city")).unwrap_or_default(),
                latitude: coordinate(detail.and_then(|d| d.get("latitude"))),
                longitude: coordinate(detail.and_then(|d| d.get("longitude"))),
            })
        })
        .collect();

    let meta = body
        .get("meta")
        .map(|m| SearchMeta {
            total: m.get("total").and_then(Value::as_u64).unwrap_or(0),
            page: m.get("page").and_then(Value::as_u64).unwrap_or(1) as u32,
            max_page: m.get("maxPage").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
        .unwrap_or_default();

    RegionResults { hotels, meta }
}

/// Flatten every option's rooms into one list.
pub fn parse_property_rooms(body: &Value) -> PropertyRooms {
    let Some(data) = succeeded(body) else {
        return PropertyRooms::default();
    };

    let detail = data.get("detail");
    let property = text(data, "id").map(|id| PropertyDetail {
        id,
        name: text(data, "name").unwrap_or_default(),
        star_class: star_class(data.get("class")).unwrap_or(0),
        review_score: decimal(data.get("reviewScore")),
        address: detail.and_then(|d| text(d, "address")).unwrap_or_default(),
        city: detail.and_then(|d| text(d, "city")).unwrap_or_default(),
        latitude: coordinate(detail.and_then(|d| d.get("latitude"))),
        longitude: coordinate(detail.and_then(|d| d.get("longitude"))),
    });

    let rooms = data
        .get("options")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|option| option.get("room").and_then(Value::as_array))
        .flatten()
        .map(|room| RoomOption {
            detail_id: text(room, "detailId").unwrap_or_default(),
            room_type: text(room, "type").unwrap_or_else(|| "Room".to_string()),
            price: decimal(room.get("price")).unwrap_or_default(),
            promo_price: decimal(room.get("promoPrice")),
            max_occupancy: room
                .get("maxOccupancy")
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
                .unwrap_or(0) as u32,
            refundable: room
                .get("refundIncluded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
        .collect();

    PropertyRooms { property, rooms }
}

fn succeeded(body: &Value) -> Option<&Value> {
    if !body.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    body.get("data").filter(|d| !d.is_null())
}

/// Non-empty string or number field rendered as a string.
fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn display_name(item: &Value) -> Option<String> {
    text(item, "fullname").or_else(|| text(item, "name"))
}

fn decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(&s.trim().replace(',', ".")).ok(),
        _ => None,
    }
}

fn star_class(value: Option<&Value>) -> Option<u8> {
    let stars = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(stars.clamp(0.0, 5.0).round() as u8)
}

/// Coordinates sometimes arrive with a decimal comma.
fn coordinate(value: Option<&Value>) -> Option<f64> {
    let raw = match value? {
        Value::Number(n) => return n.as_f64(),
        Value::String(s) => s.trim().replace(',', "."),
        _ => return None,
    };
    raw.parse::<f64>().ok().filter(|c| c.is_finite())
}
