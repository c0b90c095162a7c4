use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use recount_transcript::schema::ApiUsage;

/// Dollar prices per million tokens for one model family. Unknown models get
/// zero pricing; cost estimation never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelPricing {
    pub input: Decimal,
    pub output: Decimal,
    pub cache_write: Decimal,
    pub cache_read: Decimal,
}

const MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Fast mode multiplies the token cost; surcharges are unaffected.
const FAST_MODE_MULTIPLIER: Decimal = Decimal::from_parts(6, 0, 0, false, 0);

/// Flat per-request web search surcharge ($0.01).
const WEB_SEARCH_COST: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

macro_rules! price {
    ($num:literal, $scale:literal) => {
        Decimal::from_parts($num, 0, 0, false, $scale)
    };
}

/// Family pricing table, checked by longest-prefix match so dated minor
/// releases resolve without a table update.
static FAMILIES: Lazy<Vec<(&'static str, ModelPricing)>> = Lazy::new(|| {
    vec![
        (
            "opus-4-6",
            ModelPricing {
                input: price!(5, 0),
                output: price!(25, 0),
                cache_write: price!(625, 2),
                cache_read: price!(5, 1),
            },
        ),
        (
            "opus-4-5",
            ModelPricing {
                input: price!(5, 0),
                output: price!(25, 0),
                cache_write: price!(625, 2),
                cache_read: price!(5, 1),
            },
        ),
        (
            "opus-4-1",
            ModelPricing {
                input: price!(15, 0),
                output: price!(75, 0),
                cache_write: price!(1875, 2),
                cache_read: price!(15, 1),
            },
        ),
        (
            "opus-4",
            ModelPricing {
                input: price!(15, 0),
                output: price!(75, 0),
                cache_write: price!(1875, 2),
                cache_read: price!(15, 1),
            },
        ),
        (
            "opus-3",
            ModelPricing {
                input: price!(15, 0),
                output: price!(75, 0),
                cache_write: price!(1875, 2),
                cache_read: price!(15, 1),
            },
        ),
        (
            "sonnet-4-5",
            ModelPricing {
                input: price!(3, 0),
                output: price!(15, 0),
                cache_write: price!(375, 2),
                cache_read: price!(3, 1),
            },
        ),
        (
            "sonnet-4",
            ModelPricing {
                input: price!(3, 0),
                output: price!(15, 0),
                cache_write: price!(375, 2),
                cache_read: price!(3, 1),
            },
        ),
        (
            "sonnet-3-7",
            ModelPricing {
                input: price!(3, 0),
                output: price!(15, 0),
                cache_write: price!(375, 2),
                cache_read: price!(3, 1),
            },
        ),
        (
            "sonnet-3-5",
            ModelPricing {
                input: price!(3, 0),
                output: price!(15, 0),
                cache_write: price!(375, 2),
                cache_read: price!(3, 1),
            },
        ),
        (
            "haiku-4-5",
            ModelPricing {
                input: price!(1, 0),
                output: price!(5, 0),
                cache_write: price!(125, 2),
                cache_read: price!(1, 1),
            },
        ),
        (
            "haiku-3-5",
            ModelPricing {
                input: price!(8, 1),
                output: price!(4, 0),
                cache_write: price!(1, 0),
                cache_read: price!(8, 2),
            },
        ),
        (
            "haiku-3",
            ModelPricing {
                input: price!(25, 2),
                output: price!(125, 2),
                cache_write: price!(3, 1),
                cache_read: price!(3, 2),
            },
        ),
    ]
});

/// Normalize a vendor model id to its pricing family. Handles bedrock-style
/// region/vendor prefixes, the `claude-` prefix, version-first naming
/// ("3-5-haiku"), date suffixes, and bedrock `-v1:0` suffixes.
///
/// Examples: `claude-opus-4-6` -> `opus-4-6`,
/// `claude-3-5-haiku-20241022` -> `haiku-3-5`,
/// `us.anthropic.claude-sonnet-4-20250514-v1:0` -> `sonnet-4`.
pub fn model_family(model: &str) -> String {
    let mut id = model.trim().to_ascii_lowercase();

    for prefix in ["us.", "eu.", "apac.", "global."] {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest.to_string();
        }
    }
    if let Some(rest) = id.strip_prefix("anthropic.") {
        id = rest.to_string();
    }
    if let Some(rest) = id.strip_prefix("claude-") {
        id = rest.to_string();
    }

    // Drop bedrock revision suffixes ("-v1:0") and trailing date stamps
    if let Some(pos) = id.find(":") {
        id = id[..pos].to_string();
        if let Some(stripped) = id.strip_suffix("-v1") {
            id = stripped.to_string();
        }
    }
    let parts: Vec<&str> = id
        .split('-')
        .filter(|part| !(part.len() == 8 && part.chars().all(|c| c.is_ascii_digit())))
        .collect();

    // Version-first naming ("3-5-haiku") is rotated to name-first
    let split = parts
        .iter()
        .position(|part| part.chars().next().is_some_and(|c| c.is_ascii_alphabetic()));
    match split {
        Some(0) | None => parts.join("-"),
        Some(idx) => {
            let (version, name) = parts.split_at(idx);
            let mut rotated: Vec<&str> = name.to_vec();
            rotated.extend_from_slice(version);
            rotated.join("-")
        }
    }
}

/// Price lookup for a model id. Unknown models yield zero pricing.
pub fn pricing_for(model: &str) -> ModelPricing {
    let family = model_family(model);

    let mut best: Option<ModelPricing> = None;
    let mut best_len = 0;
    for (prefix, pricing) in FAMILIES.iter() {
        if family.starts_with(prefix) && prefix.len() > best_len {
            best = Some(*pricing);
            best_len = prefix.len();
        }
    }
    best.unwrap_or_default()
}

/// Token cost: sum of per-bucket token counts times price per million.
pub fn cost(
    pricing: &ModelPricing,
    input: u64,
    output: u64,
    cache_creation: u64,
    cache_read: u64,
) -> Decimal {
    let total = Decimal::from(input) * pricing.input
        + Decimal::from(output) * pricing.output
        + Decimal::from(cache_creation) * pricing.cache_write
        + Decimal::from(cache_read) * pricing.cache_read;
    (total / MILLION).normalize()
}

/// Full cost of one usage record: token cost, times six under fast mode, plus
/// the flat web search surcharge (never multiplied). Web fetches are free.
pub fn total_cost(pricing: &ModelPricing, usage: &ApiUsage) -> Decimal {
    let mut base = cost(
        pricing,
        usage.input_tokens,
        usage.output_tokens,
        usage.cache_creation_input_tokens,
        usage.cache_read_input_tokens,
    );
    if usage.is_fast() {
        base *= FAST_MODE_MULTIPLIER;
    }
    let surcharge = Decimal::from(usage.web_search_requests()) * WEB_SEARCH_COST;
    (base + surcharge).normalize()
}
