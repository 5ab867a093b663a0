//! Lenient parsing of model output into validated multiple-choice questions.

use super::QuizQuestion;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub(crate) const OPTION_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Value,
    #[serde(default, alias = "answer", alias = "correct")]
    correct_answer: String,
    #[serde(default)]
    explanation: Option<String>,
}

/// Locate the first JSON array of objects in `output` and turn its entries into questions.
///
/// Returns `None` when no such array can be decoded. Entries that fail validation are dropped.
pub(crate) fn parse_questions(output: &str) -> Option<Vec<QuizQuestion>> {
    let Some(raw) = first_object_array(output) else {
        tracing::warn!("Model output did not contain a valid question array");
        return None;
    };
    let total = raw.len();
    let questions: Vec<QuizQuestion> = raw
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawQuestion>(entry).ok())
        .filter_map(validate)
        .collect();
    if questions.len() < total {
        tracing::debug!(
            dropped = total - questions.len(),
            kept = questions.len(),
            "Dropped malformed quiz questions"
        );
    }
    Some(questions)
}

/// Decode a JSON array at each `[` in turn; bracketed prose and option lists are skipped.
fn first_object_array(output: &str) -> Option<Vec<Value>> {
    output.match_indices('[').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&output[start..])
            .into_iter::<Vec<Value>>()
            .next()
            .and_then(Result::ok)
            .filter(|entries| entries.iter().any(Value::is_object))
    })
}

fn validate(raw: RawQuestion) -> Option<QuizQuestion> {
    let question = raw.question.trim().to_string();
    if question.is_empty() {
        return None;
    }
    let options = normalize_options(&raw.options)?;
    let correct_answer = resolve_answer(&raw.correct_answer, &options)?;
    Some(QuizQuestion {
        question,
        options,
        correct_answer,
        explanation: raw
            .explanation
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    })
}

/// Accept `{"A": "..", ...}` objects or four-element arrays; require exactly A-D, all non-empty.
fn normalize_options(value: &Value) -> Option<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (key, text) in map {
                let letter = key
                    .trim()
                    .chars()
                    .next()
                    .map(|c| c.to_ascii_uppercase().to_string())?;
                options.insert(letter, strip_letter_prefix(text.as_str()?).to_string());
            }
        }
        Value::Array(items) => {
            for (letter, text) in OPTION_LETTERS.iter().zip(items) {
                options.insert(
                    (*letter).to_string(),
                    strip_letter_prefix(text.as_str()?).to_string(),
                );
            }
            if items.len() != OPTION_LETTERS.len() {
                return None;
            }
        }
        _ => return None,
    }

    let complete = options.len() == OPTION_LETTERS.len()
        && OPTION_LETTERS
            .iter()
            .all(|letter| options.get(*letter).is_some_and(|text| !text.is_empty()));
    complete.then_some(options)
}

/// Drop a leading `A)`, `A.` or `A:` marker the model sometimes repeats inside option text.
fn strip_letter_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(')' | '.' | ':'))
            if OPTION_LETTERS.contains(&letter.to_ascii_uppercase().to_string().as_str()) =>
        {
            chars.as_str().trim()
        }
        _ => trimmed,
    }
}

/// Resolve the correct answer to a letter, accepting the option text, `"b"` or `"B) text"`.
fn resolve_answer(raw: &str, options: &BTreeMap<String, String>) -> Option<String> {
    let trimmed = raw.trim();
    options
        .iter()
        .find(|(_, text)| text.eq_ignore_ascii_case(trimmed))
        .map(|(letter, _)| letter.clone())
        .or_else(|| normalize_letter(trimmed))
}

/// Upper-cased option letter when `answer` is a bare letter or starts with `X)`/`X.`/`X:`.
pub(crate) fn normalize_letter(answer: &str) -> Option<String> {
    let trimmed = answer.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?.to_ascii_uppercase().to_string();
    if !OPTION_LETTERS.contains(&first.as_str()) {
        return None;
    }
    match chars.next() {
        None | Some(')' | '.' | ':') => Some(first),
        _ => None,
    }
}
