use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::error::AnalysisError;
use crate::models::{HealthRating, NutritionRecord};

// ```json ... ``` or ``` ... ```, non-greedy so each block is matched separately
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[jJ][sS][oO][nN])?[ \t]*\r?\n?(.*?)```").unwrap());

/// Calorie values above this are passed through but logged.
const IMPLAUSIBLE_CALORIES: f64 = 10_000.0;

/// Outcome of one extraction strategy.
#[derive(Debug)]
pub enum ExtractionAttempt {
    Found(Value),
    /// The strategy found nothing to look at.
    NoCandidate,
    /// A candidate was found but was not valid JSON.
    Malformed(String),
}

type Strategy = fn(&str) -> ExtractionAttempt;

/// Tried in order, first `Found` wins.
const STRATEGIES: [(&str, Strategy); 3] = [
    ("fenced block", from_fenced_block),
    ("bracket span", from_bracket_span),
    ("whole text", from_whole_text),
];

/// Extract and validate a nutrition record from free-form model output.
pub fn parse_nutrition(raw: &str) -> Result<NutritionRecord, AnalysisError> {
    let value = extract_json(raw).ok_or_else(|| {
        log::error!("❌ Failed to parse AI response: {}", raw);
        AnalysisError::Parse {
            raw: raw.to_string(),
        }
    })?;
    validate(value)
}

/// Run the extraction strategies in order and return the first parsed value.
pub fn extract_json(raw: &str) -> Option<Value> {
    for (name, strategy) in STRATEGIES {
        match strategy(raw) {
            ExtractionAttempt::Found(value) => {
                log::debug!("🔎 Extracted JSON using {} strategy", name);
                return Some(value);
            }
            ExtractionAttempt::NoCandidate => {
                log::debug!("🔎 No candidate for {} strategy", name);
            }
            ExtractionAttempt::Malformed(e) => {
                log::debug!("🔎 {} strategy found malformed JSON: {}", name, e);
            }
        }
    }
    None
}

pub fn from_fenced_block(text: &str) -> ExtractionAttempt {
    let mut last_error = None;
    for caps in FENCED_BLOCK.captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if body.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => return ExtractionAttempt::Found(value),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    match last_error {
        Some(e) => ExtractionAttempt::Malformed(e),
        None => ExtractionAttempt::NoCandidate,
    }
}

pub fn from_bracket_span(text: &str) -> ExtractionAttempt {
    match first_object_span(text) {
        Some(span) => match serde_json::from_str::<Value>(span) {
            Ok(value) => ExtractionAttempt::Found(value),
            Err(e) => ExtractionAttempt::Malformed(e.to_string()),
        },
        None => ExtractionAttempt::NoCandidate,
    }
}

pub fn from_whole_text(text: &str) -> ExtractionAttempt {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ExtractionAttempt::NoCandidate;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => ExtractionAttempt::Found(value),
        Err(e) => ExtractionAttempt::Malformed(e.to_string()),
    }
}

/// The first balanced `{...}` span, skipping braces inside JSON strings.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Check the minimal shape and build a typed record.
pub fn validate(value: Value) -> Result<NutritionRecord, AnalysisError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AnalysisError::Schema("expected a JSON object".to_string()))?;

    let food_name = match obj.get("foodName") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            return Err(AnalysisError::Schema(
                "foodName must be a non-empty string".to_string(),
            ))
        }
    };

    let calories = match obj.get("calories").and_then(Value::as_f64) {
        Some(c) if c.is_finite() && c >= 0.0 => c,
        Some(c) => {
            return Err(AnalysisError::Schema(format!(
                "calories must not be negative, got {}",
                c
            )))
        }
        None => {
            return Err(AnalysisError::Schema(
                "calories must be a number".to_string(),
            ))
        }
    };
    if calories > IMPLAUSIBLE_CALORIES {
        log::warn!("⚠️ Implausible calorie value for {}: {}", food_name, calories);
    }

    Ok(NutritionRecord {
        food_name,
        calories: calories.round().min(u32::MAX as f64) as u32,
        protein: grams(obj, "protein")?,
        carbs: grams(obj, "carbs")?,
        fat: grams(obj, "fat")?,
        health_rating: health_rating(obj),
        vitamins: text_field(obj, "vitamins"),
        minerals: text_field(obj, "minerals"),
    })
}

/// Optional gram value. Numeric strings like "12.5" or "12.5g" are coerced,
/// anything else unusable is dropped.
fn grams(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, AnalysisError> {
    let value = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('g').trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        Some(v) if v < 0.0 => Err(AnalysisError::Schema(format!(
            "{} must not be negative, got {}",
            key, v
        ))),
        _ => {
            log::warn!("⚠️ Ignoring unusable {} value: {:?}", key, obj.get(key));
            Ok(None)
        }
    }
}

fn health_rating(obj: &Map<String, Value>) -> Option<HealthRating> {
    let raw = obj.get("healthRating")?.as_str()?;
    let rating = HealthRating::from_string(raw);
    if rating.is_none() {
        log::warn!("⚠️ Unknown healthRating: {}", raw);
    }
    rating
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
