//! Keyword and pattern based intent detection.
//!
//! Everything here is pure. The flow engine only sees [`IntentSignal`], so the
//! rules can be swapped for another [`IntentClassifier`] without touching the
//! state machine.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

/// Budgets written as a bare number below this are ignored.
pub const MIN_DIRECT_BUDGET: u32 = 50_000;

static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(rb|ribu|k)\b").unwrap());
static MILLIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(jt|juta|million|mio|m)\b").unwrap()
});
static DIRECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:\.\d{3})+\b|\d{5,}").unwrap());

/// Words that start a location phrase.
const LOCATION_PREPOSITIONS: &[&str] = &[
    "in", "at", "to", "near", "around", "area", "city", "region", "di", "ke", "daerah", "kota",
    "wilayah", "sekitar",
];

/// Words that end a location phrase.
const PHRASE_TERMINATORS: &[&str] = &[
    "for", "on", "from", "with", "under", "below", "budget", "max", "maximum", "until", "by",
    "please", "untuk", "pada", "dari", "dengan", "dibawah", "bawah", "maksimal", "maks",
    "tanggal", "tgl", "mulai", "sampai", "tolong", "ya", "dong", "aja", "saja", "and", "dan",
];

/// Generic booking verbs and nouns that are never a location.
const LOCATION_STOPWORDS: &[&str] = &[
    "hotel", "hotels", "menginap", "nginep", "booking", "book", "pesan", "cari", "carikan", "di",
    "ke", "saya", "aku", "mau", "ingin", "bisa", "butuh", "perlu", "i", "want", "need", "to",
    "stay", "staying", "a", "an", "the", "find", "search", "looking", "for", "me", "place",
    "room", "rooms", "kamar", "please", "tolong", "in", "at", "resort", "villa", "penginapan",
    "staycation", "accommodation", "lodging", "night", "nights", "malam", "yang", "murah",
    "cheap", "good", "nice", "bagus", "my", "our", "we", "you", "your", "kami", "kita",
];

const CANCEL_KEYWORDS: &[&str] = &[
    "batal",
    "cancel",
    "stop",
    "reset",
    "keluar",
    "exit",
    "quit",
    "batalkan",
    "ulang",
    "mulai lagi",
    "start over",
];

const ACCOMMODATION_KEYWORDS: &[&str] = &[
    "hotel",
    "menginap",
    "nginep",
    "booking",
    "pesan hotel",
    "cari hotel",
    "penginapan",
    "akomodasi",
    "accommodation",
    "lodging",
    "resort",
    "staycation",
    "stay",
    "check in",
    "checkin",
    "check-in",
    "inap",
    "bermalam",
    "villa",
    "guesthouse",
    "homestay",
    "hostel",
    "apartemen",
    "apartment",
];

const TRAVEL_VERBS: &[&str] = &[
    "ingin", "mau", "butuh", "cari", "carikan", "perlu", "want", "need", "looking", "find",
    "search",
];

/// What kind of non-booking message a text looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralKind {
    /// Wh-question or a question about the assistant itself.
    Question,
    Greeting,
    Gratitude,
    HelpRequest,
}

/// Everything the flow engine needs to know about one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentSignal {
    pub cancel: bool,
    pub general: Option<GeneralKind>,
    pub booking_trigger: bool,
    pub budget: Option<Decimal>,
    pub location_phrase: Option<String>,
}

impl IntentSignal {
    pub fn is_general_question(&self) -> bool {
        self.general.is_some()
    }
}

/// Replaceable intent detection strategy.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> IntentSignal;
}

/// A general-conversation pattern with the kind it signals.
#[derive(Debug, Clone)]
struct GeneralRule {
    regex: Regex,
    kind: GeneralKind,
}

/// Default classifier: English and Indonesian keyword lists plus a handful of
/// anchored regexes.
pub struct KeywordClassifier {
    general_rules: Vec<GeneralRule>,
    location_prefix: Regex,
}

impl KeywordClassifier {
    pub fn default_rules() -> Self {
        let general_rules = vec![
            // Wh-question openers
            GeneralRule {
                regex: Regex::new(
                    r"^(who|what|when|where|why|how|which|siapa|apa|kapan|dimana|di mana|kenapa|mengapa|bagaimana|gimana|berapa)\b",
                )
                .unwrap(),
                kind: GeneralKind::Question,
            },
            // Questions about the assistant
            GeneralRule {
                regex: Regex::new(
                    r"\bkamu (siapa|apa|bisa|ada|punya|tau|tahu|ngapain)\b|\bapa itu\b|\b(can|could|do) you\b|\bare you\b",
                )
                .unwrap(),
                kind: GeneralKind::Question,
            },
            GeneralRule {
                regex: Regex::new(
                    r"\b(bisa apa|bisa ngapain|bisa bantu apa|fungsi|kegunaan|manfaat)\b",
                )
                .unwrap(),
                kind: GeneralKind::Question,
            },
            GeneralRule {
                regex: Regex::new(r"\b(tolong|bantuan|help)\b").unwrap(),
                kind: GeneralKind::HelpRequest,
            },
            GeneralRule {
                regex: Regex::new(r"\b(hi|hello|halo|hai|hei|hey)\b").unwrap(),
                kind: GeneralKind::Greeting,
            },
            GeneralRule {
                regex: Regex::new(r"\b(terima kasih|makasih|thanks|thank you|thx)\b").unwrap(),
                kind: GeneralKind::Gratitude,
            },
        ];

        Self {
            general_rules,
            location_prefix: Regex::new(
                r"\b(in|at|to|near|di|ke|area|daerah|kota|wilayah)\s+[a-z]",
            )
            .unwrap(),
        }
    }

    /// True if the text contains any cancellation keyword (substring match).
    pub fn is_cancel_intent(&self, text: &str) -> bool {
        let lower = normalize(text);
        CANCEL_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    /// Classify small talk and questions that should leave the booking flow.
    pub fn general_kind(&self, text: &str) -> Option<GeneralKind> {
        let lower = normalize(text);
        self.general_rules
            .iter()
            .find(|rule| rule.regex.is_match(&lower))
            .map(|rule| rule.kind)
    }

    pub fn is_general_question(&self, text: &str) -> bool {
        self.general_kind(text).is_some()
    }

    /// Accommodation keyword, or a "<travel verb> ... in <place>" message.
    pub fn is_booking_trigger(&self, text: &str) -> bool {
        let lower = normalize(text);
        if ACCOMMODATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return true;
        }
        let words: Vec<&str> = tokens(&lower).collect();
        self.location_prefix.is_match(&lower) && TRAVEL_VERBS.iter().any(|v| words.contains(v))
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> IntentSignal {
        IntentSignal {
            cancel: self.is_cancel_intent(text),
            general: self.general_kind(text),
            booking_trigger: self.is_booking_trigger(text),
            budget: extract_budget(text),
            location_phrase: extract_location_phrase(text),
        }
    }
}

/// Parse a per-night budget.
///
/// Tried in order: thousands shorthand (`500rb`, `500k`), millions shorthand
/// (`1.5jt`, `2 juta`), then a bare amount of five or more digits (or dotted
/// thousands like `750.000`) that is at least [`MIN_DIRECT_BUDGET`]. Amounts
/// too large to represent yield `None`.
pub fn extract_budget(text: &str) -> Option<Decimal> {
    if let Some(caps) = THOUSANDS.captures(text) {
        let amount = Decimal::from_str(&caps[1]).ok()?;
        return amount.checked_mul(Decimal::from(1_000));
    }

    if let Some(caps) = MILLIONS.captures(text) {
        let amount = Decimal::from_str(&caps[1].replace(',', ".")).ok()?;
        return amount
            .checked_mul(Decimal::from(1_000_000))
            .map(|budget| budget.normalize());
    }

    let direct = DIRECT.find(text)?;
    let amount = Decimal::from_str(&direct.as_str().replace('.', "")).ok()?;
    (amount >= Decimal::from(MIN_DIRECT_BUDGET)).then_some(amount)
}

/// Pull the place name out of a booking request.
///
/// Takes the words after the first location preposition that is not followed
/// by a booking verb, stopping at a number, another preposition, or a filler
/// word. Falls back to the last word that is not a generic booking term.
/// Original casing is kept.
pub fn extract_location_phrase(text: &str) -> Option<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

    for (i, word) in lower.iter().enumerate() {
        if !LOCATION_PREPOSITIONS.contains(&word.as_str()) {
            continue;
        }
        let phrase: Vec<&str> = words[i + 1..]
            .iter()
            .zip(&lower[i + 1..])
            .take_while(|(_, low)| {
                !starts_with_digit(low)
                    && !LOCATION_PREPOSITIONS.contains(&low.as_str())
                    && !PHRASE_TERMINATORS.contains(&low.as_str())
            })
            .map(|(orig, _)| *orig)
            .collect();
        let Some(first) = phrase.first() else {
            continue;
        };
        if LOCATION_STOPWORDS.contains(&first.to_lowercase().as_str()) {
            continue;
        }
        return Some(phrase.join(" "));
    }

    words
        .iter()
        .zip(&lower)
        .rev()
        .find(|(_, low)| {
            !starts_with_digit(low)
                && !LOCATION_STOPWORDS.contains(&low.as_str())
                && !LOCATION_PREPOSITIONS.contains(&low.as_str())
                && !PHRASE_TERMINATORS.contains(&low.as_str())
                && !ACCOMMODATION_KEYWORDS.contains(&low.as_str())
        })
        .map(|(orig, _)| orig.to_string())
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokens(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn starts_with_digit(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_ascii_digit())
}
