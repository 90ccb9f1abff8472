//! User-facing text for every booking step and for search results.
//!
//! Output uses the lightweight chat markup transports understand: `*bold*`,
//! `_italic_`, `~strike~`.

use std::fmt::Write;

use rust_decimal::Decimal;

use crate::booking::dates::{DATE_FORMAT_HINT, display_date, format_price};
use crate::booking::state::ReadySearch;
use crate::config::BookingConfig;
use crate::search::{
    LocationMatch, Occupancy, PropertyRooms, RegionResults, maps_link,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

pub fn location_found(location: &LocationMatch) -> String {
    match location {
        LocationMatch::Region { name, .. } => {
            format!("I found the area: *{name}* 📍\n\nIs this the right location? (Yes/No)")
        }
        LocationMatch::Property {
            name, star_rating, ..
        } => {
            let stars = stars(star_rating.unwrap_or(0));
            format!(
                "I found the hotel: *{name}* {stars}\n\nShall I look for rooms there? (Yes/No)"
            )
        }
    }
}

pub fn ask_for_location() -> String {
    "Sorry, I couldn't tell which place you mean. Which city or area are you heading to?\n\n\
     Example: I want to stay in Jakarta"
        .to_string()
}

pub fn location_not_found(query: &str) -> String {
    format!(
        "Sorry, I couldn't find \"{query}\". Could you try another city?\n\n\
         Example: Jakarta, Bali, Bandung, Surabaya"
    )
}

pub fn location_rejected() -> String {
    "Okay, please tell me the right location.\n\nExample: I want to stay in Bali".to_string()
}

pub fn ask_yes_no() -> String {
    "Please answer Yes or No.".to_string()
}

pub fn ask_check_in() -> String {
    format!(
        "Great! When would you like to check in? 📅\n\n\
         Format: {DATE_FORMAT_HINT} or type \"tomorrow\"\nExample: 16-11-2025"
    )
}

pub fn invalid_check_in() -> String {
    format!(
        "Sorry, that date doesn't look right. Please try again.\n\n\
         Format: {DATE_FORMAT_HINT}\nExample: 16-11-2025 or tomorrow"
    )
}

pub fn ask_check_out(check_in: chrono::NaiveDate) -> String {
    format!(
        "Check-in: {} ✅\n\nWhen would you like to check out? 📅\n\n\
         Format: {DATE_FORMAT_HINT}\nExample: 17-11-2025",
        display_date(check_in)
    )
}

pub fn invalid_check_out() -> String {
    format!(
        "Sorry, that date doesn't look right. Please try again.\n\n\
         Format: {DATE_FORMAT_HINT}\nExample: 17-11-2025"
    )
}

pub fn check_out_not_after(check_in: chrono::NaiveDate) -> String {
    format!(
        "The check-out date has to be after check-in ({}). Please enter another check-out date.",
        display_date(check_in)
    )
}

pub fn ask_guests(check_out: chrono::NaiveDate) -> String {
    format!(
        "Check-out: {} ✅\n\nHow many guests? 👥\n\n\
         Format: Adults-Children-Infants\nExample: 2-0-0 (2 adults, no children)\n\
         Or just the number of adults: 2",
        display_date(check_out)
    )
}

pub fn invalid_guests() -> String {
    "I couldn't read that. How many guests?\n\n\
     Example: 2-1-0 (2 adults, 1 child, 0 infants)\nOr: 2 (2 adults only)"
        .to_string()
}

pub fn at_least_one_adult() -> String {
    "At least 1 adult is required. Please try again.".to_string()
}

pub fn ask_rooms(occupancy: &Occupancy) -> String {
    format!(
        "Guests: {} ✅\n\nHow many rooms do you need? 🛏️\n\nExample: 1 or 2",
        guests(occupancy)
    )
}

pub fn invalid_rooms() -> String {
    "That room count isn't valid. At least 1 room.\n\nExample: 1".to_string()
}

pub fn ask_budget(rooms: u32) -> String {
    format!(
        "Rooms: {rooms} ✅\n\nDo you have a maximum budget per night? 💰\n\n\
         Example: 500k, 1jt, 1.5 million\nOr type skip to see every hotel"
    )
}

pub fn invalid_budget() -> String {
    "I couldn't read that budget. Please try again.\n\n\
     Example: 500k, 1jt, 1.5 million\nOr type skip"
        .to_string()
}

pub fn cancelled() -> String {
    "Hotel search cancelled. Just ask again whenever you want to look for a hotel. 🙏".to_string()
}

pub fn search_failed() -> String {
    "Sorry, I couldn't reach the hotel search right now. Please try again in a moment. 🙏"
        .to_string()
}

pub fn flow_reset() -> String {
    "Sorry, something went wrong with your hotel search and I had to start over. \
     Tell me where you'd like to stay."
        .to_string()
}

pub fn nothing_in_region(name: &str) -> String {
    format!(
        "Sorry, there are no hotels available in {name} for those dates. 😔\n\n\
         Want to try different dates or another location?"
    )
}

pub fn property_unavailable(name: &str) -> String {
    format!(
        "Sorry, {name} has no rooms available for those dates. 😔\n\n\
         Want to try different dates or another hotel?"
    )
}

/// Listing of the top properties in a region.
pub fn region_results(
    search: &ReadySearch,
    results: &RegionResults,
    config: &BookingConfig,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🏨 *HOTELS IN {}*\n", search.location.name().to_uppercase());
    trip_summary(&mut out, search);
    if let Some(budget) = search.budget_per_night.filter(|b| *b < config.default_max_price) {
        let _ = writeln!(out, "💰 Budget: up to {}/night", format_price(budget));
    }
    let _ = writeln!(out, "\n{RULE}\n");

    for (i, hotel) in results
        .hotels
        .iter()
        .take(config.region_result_limit)
        .enumerate()
    {
        let _ = writeln!(out, "{}. {}", i + 1, hotel.name);
        if hotel.star_class > 0 {
            let _ = writeln!(out, "{}", stars(hotel.star_class));
        }
        let _ = write!(out, "💰 {}", format_price(hotel.effective_price()));
        if hotel.effective_price() != hotel.price {
            let _ = write!(out, " ~{}~ 🔥", format_price(hotel.price));
        }
        out.push('\n');
        if let Some(score) = hotel.review_score.filter(|s| !s.is_zero()) {
            let _ = writeln!(out, "⭐ Rating: {}/10", score.normalize());
        }
        if !hotel.address.is_empty() {
            let _ = writeln!(out, "📍 {}", hotel.address);
        }
        if let (Some(lat), Some(lon)) = (hotel.latitude, hotel.longitude) {
            let _ = writeln!(out, "🗺️ Map: {}", maps_link(lat, lon));
        }
        out.push('\n');
    }

    closing(&mut out, config, "Tell me which hotel you like to get the best offer!");
    out
}

/// Listing of room options for one property.
pub fn property_rooms(search: &ReadySearch, rooms: &PropertyRooms, config: &BookingConfig) -> String {
    let mut out = String::new();
    let name = rooms
        .property
        .as_ref()
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(search.location.name());
    let _ = writeln!(out, "🏨 *{}*", name.to_uppercase());
    if let Some(property) = &rooms.property {
        if property.star_class > 0 {
            let _ = writeln!(out, "{}", stars(property.star_class));
        }
    }
    out.push('\n');
    trip_summary(&mut out, search);
    if let Some(property) = &rooms.property {
        if !property.address.is_empty() {
            let _ = writeln!(out, "📍 {}", property.address);
        }
        if let (Some(lat), Some(lon)) = (property.latitude, property.longitude) {
            let _ = writeln!(out, "🗺️ Map: {}", maps_link(lat, lon));
        }
    }
    let _ = writeln!(out, "\n{RULE}\n*ROOM OPTIONS:*\n");

    for (i, room) in rooms.rooms.iter().take(config.room_option_limit).enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, room.room_type);
        let _ = write!(out, "💰 {}", format_price(room.price));
        if let Some(promo) = room.promo_price.filter(|p| *p != room.price && !p.is_zero()) {
            let _ = write!(out, " ~{}~ 🔥", format_price(promo));
        }
        out.push('\n');
        if room.max_occupancy > 0 {
            let _ = writeln!(out, "👥 Up to {} guests", room.max_occupancy);
        }
        let _ = writeln!(
            out,
            "{}\n",
            if room.refundable {
                "✅ Refundable"
            } else {
                "❌ Non-refundable"
            }
        );
    }

    closing(&mut out, config, "Tell me which room type you like to get the best offer!");
    out
}

/// `2 adults, 1 child`.
pub fn guests(occupancy: &Occupancy) -> String {
    let mut parts = vec![plural(occupancy.adults, "adult", "adults")];
    if occupancy.children > 0 {
        parts.push(plural(occupancy.children, "child", "children"));
    }
    if occupancy.infants > 0 {
        parts.push(plural(occupancy.infants, "infant", "infants"));
    }
    parts.join(", ")
}

fn trip_summary(out: &mut String, search: &ReadySearch) {
    let _ = writeln!(
        out,
        "📅 {} - {}",
        display_date(search.check_in),
        display_date(search.check_out)
    );
    let _ = writeln!(out, "👥 {}", guests(&search.occupancy));
    let _ = writeln!(out, "🛏️ {}", plural(search.rooms, "room", "rooms"));
}

fn closing(out: &mut String, config: &BookingConfig, call_to_action: &str) {
    let _ = writeln!(out, "{RULE}\n");
    if !config.contact_lines.is_empty() {
        let _ = writeln!(out, "To book, contact our customer service:");
        for line in &config.contact_lines {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
    }
    let _ = write!(out, "_{call_to_action}_");
}

fn stars(count: u8) -> String {
    "⭐".repeat(count as usize)
}

fn plural(n: u32, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

/// Budget line shown in logs and summaries.
pub fn budget_label(budget: Option<Decimal>) -> String {
    budget.map_or_else(|| "any".to_string(), format_price)
}
