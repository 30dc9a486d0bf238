//! Rule-based intent parsing.
//!
//! Rules are tried in authoring order and the first match wins. Matching runs
//! on the lower-cased request with any embedded JSON object cut out, so keys
//! and values inside the JSON never pick the verb.

use medorch_common::{Entities, Intent, ParseFailure, Verb};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Entity extractors a rule can run on free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// `count`: first integer, else first number word
    Count,
    /// `age`, `sex`, `conditions`, `symptoms`, `location`
    Patient,
    /// `imaging_report`: an image file reference
    ImagingReport,
    /// `genomics_summary`: a gene variant such as `BRCA1 5382insC`
    GenomicsSummary,
    /// `message`: the whole request
    Message,
    /// `query`: the tail after "search", "find" or "look up", else the whole request
    Query,
    /// `logs`: an embedded JSON array
    Logs,
}

/// One pattern rule.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub verb: Verb,
    pub pattern: Regex,
    pub extractors: Vec<Extractor>,
}

const DEFAULT_RULES: &[(Verb, &str, &[Extractor])] = &[
    (
        Verb::RunPipeline,
        r"\b(full\s*pipeline|run\s*all|end\s*to\s*end|orchestrate)\b",
        &[Extractor::Patient],
    ),
    (
        Verb::Synthesize,
        r"(\b(create|generate|make)\b.*\b(synthetic|patients?)\b)|^\s*(synthetic|patients?)\b",
        &[Extractor::Count],
    ),
    (
        Verb::Diagnose,
        r"\b(diagnose|diagnosis|what\s+is\s+the\s+diagnosis|symptoms?)\b",
        &[
            Extractor::Patient,
            Extractor::ImagingReport,
            Extractor::GenomicsSummary,
        ],
    ),
    (
        Verb::AnalyzeImaging,
        r"\b(image|imaging|scan|mri|ct|x-?ray|dicom)\b",
        &[Extractor::ImagingReport],
    ),
    (
        Verb::AnalyzeVariant,
        r"\b(genom\w*|variant|snv|cnv|dna|gene)\b",
        &[Extractor::GenomicsSummary],
    ),
    (
        Verb::PlanDiet,
        r"\b(diet|meal|nutrition|meal\s*plan|diet\s*plan)\b",
        &[Extractor::Patient],
    ),
    (
        Verb::SuggestDrugs,
        r"\b(drugs?|compounds?|molecules?|lead\s*opt\w*|hit\s*discovery)\b",
        &[Extractor::Query],
    ),
    (
        Verb::CheckEthics,
        r"\b(ethic\w*|bias|fairness|explainability|audit\w*)\b",
        &[Extractor::Logs],
    ),
    (
        Verb::SearchLiterature,
        r"\b(literature|papers?|pubmed|stud(y|ies)|citations?|references?)\b",
        &[Extractor::Query],
    ),
    (
        Verb::Counsel,
        r"\b(mental|anxiety|anxious|depress\w*|stress\w*|worried|counsel\w*)\b",
        &[Extractor::Message],
    ),
    (
        Verb::MatchTrials,
        r"\b(trials?|clinical\s*trials?|recruiting|nct)\b",
        &[Extractor::Patient],
    ),
    (
        Verb::PlanTreatment,
        r"\b(treat\w*|therapy|protocol|care\s*plan)\b",
        &[Extractor::Patient],
    ),
];

static DEFAULT_INTENT_RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    DEFAULT_RULES
        .iter()
        .map(|(verb, pattern, extractors)| IntentRule {
            verb: *verb,
            pattern: Regex::new(pattern).expect("built-in intent pattern is valid"),
            extractors: extractors.to_vec(),
        })
        .collect()
});

const NUMBER_WORDS: &[(&str, u64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

const SYMPTOMS: &[&str] = &[
    "chest pain",
    "cough",
    "fever",
    "fatigue",
    "headache",
    "shortness of breath",
];

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("valid regex"));
static WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]+").expect("valid regex"));
static AGE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bage\s*(\d{1,3})\b").expect("valid regex"));
static AGE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3})\s*(yo\b|y/o|years?\s*old\b|year-old\b)").expect("valid regex")
});
static FEMALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(female|woman|she|her)\b").expect("valid regex"));
static MALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(male|man|he|him|his)\b").expect("valid regex"));
static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|near)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*)").expect("valid regex")
});
static IMAGE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\w\-/\.]+\.(?:png|jpe?g|dcm))\b").expect("valid regex")
});
static QUERY_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\b(?:search|find|look\s*up)\b(.*)$").expect("valid regex"));
static QUERY_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:the|recent|latest)\s+)*(?:literature|papers?|pubmed|studies|study|articles?)?\s*(?:for|on|about)\s+",
    )
    .expect("valid regex")
});
static LOG_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));
static GENE_VARIANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Z0-9]{1,7}\s+(?:[cpg]\.)?[0-9]+[A-Za-z0-9>_+\-]*)").expect("valid regex")
});

/// Converts free text into an [`Intent`].
#[derive(Debug, Clone)]
pub struct IntentParser {
    rules: Vec<IntentRule>,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentParser {
    /// Parser with the built-in rule set.
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_INTENT_RULES.clone(),
        }
    }

    /// Parser with no rules; everything parses as `unknown` unless it
    /// carries a JSON object.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. It only wins when no earlier rule matches.
    pub fn add_rule(
        &mut self,
        verb: Verb,
        pattern: &str,
        extractors: &[Extractor],
    ) -> std::result::Result<(), regex::Error> {
        let pattern = Regex::new(&format!("(?i){}", pattern))?;
        self.rules.push(IntentRule {
            verb,
            pattern,
            extractors: extractors.to_vec(),
        });
        Ok(())
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Parse a request. Never fails: malformed JSON yields a `parse_error`
    /// intent and unmatched text yields `unknown`.
    pub fn parse(&self, text: &str) -> Intent {
        let (match_text, json_entities) = match extract_json_fragment(text) {
            Some((start, end)) => {
                let fragment = &text[start..end];
                match serde_json::from_str::<Value>(fragment) {
                    Ok(Value::Object(map)) => {
                        let stripped = format!("{} {}", &text[..start], &text[end..]);
                        (stripped, Some(map.into_iter().collect::<Entities>()))
                    }
                    Ok(other) => {
                        return Intent::parse_error(
                            text,
                            ParseFailure {
                                fragment: fragment.to_string(),
                                message: format!("expected a JSON object, found {}", other),
                            },
                        );
                    }
                    Err(e) => {
                        debug!(fragment = %fragment, error = %e, "Embedded JSON rejected");
                        return Intent::parse_error(
                            text,
                            ParseFailure {
                                fragment: fragment.to_string(),
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }
            None => (text.to_string(), None),
        };

        let lower = match_text.to_lowercase();
        let rule = self.rules.iter().find(|r| r.pattern.is_match(&lower));

        let intent = match (rule, json_entities) {
            (Some(rule), Some(entities)) => Intent::new(text, rule.verb, entities),
            (None, Some(entities)) => Intent::new(text, Verb::RunPipeline, entities),
            (Some(rule), None) => Intent::new(text, rule.verb, extract(&rule.extractors, text)),
            (None, None) => Intent::unknown(text),
        };

        debug!(
            verb = %intent.verb(),
            entities = intent.entities().len(),
            "Parsed intent"
        );
        intent
    }
}

/// Locate the first brace-delimited substring.
///
/// Returns byte offsets `[start, end)`. The scan balances braces outside of
/// string literals; an unterminated object runs to the end of the text.
fn extract_json_fragment(s: &str) -> Option<(usize, usize)> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
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
                    return Some((start, start + i + 1));
                }
            }
            _ => {}
        }
    }

    Some((start, s.len()))
}

fn extract(extractors: &[Extractor], text: &str) -> Entities {
    let mut entities = Entities::new();
    let lower = text.to_lowercase();

    for extractor in extractors {
        match extractor {
            Extractor::Count => {
                if let Some(count) = extract_count(&lower) {
                    entities.insert("count".into(), Value::from(count));
                }
            }
            Extractor::Patient => extract_patient(text, &lower, &mut entities),
            Extractor::ImagingReport => {
                if let Some(m) = IMAGE_FILE.captures(text).and_then(|c| c.get(1)) {
                    entities.insert("imaging_report".into(), Value::from(m.as_str()));
                }
            }
            Extractor::GenomicsSummary => {
                if let Some(m) = GENE_VARIANT.captures(text).and_then(|c| c.get(1)) {
                    entities.insert("genomics_summary".into(), Value::from(m.as_str().trim()));
                }
            }
            Extractor::Message => {
                entities.insert("message".into(), Value::from(text.trim()));
            }
            Extractor::Query => {
                entities.insert("query".into(), Value::from(extract_query(text)));
            }
            Extractor::Logs => {
                let logs = LOG_LIST
                    .find(text)
                    .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
                    .filter(Value::is_array);
                if let Some(logs) = logs {
                    entities.insert("logs".into(), logs);
                }
            }
        }
    }

    entities
}

fn extract_count(lower: &str) -> Option<u64> {
    if let Some(n) = INTEGER
        .captures(lower)
        .and_then(|c| c[1].parse::<u64>().ok())
    {
        return Some(n.max(1));
    }
    // First number word in reading order.
    WORDS.find_iter(lower).find_map(|w| {
        NUMBER_WORDS
            .iter()
            .find(|(word, _)| *word == w.as_str())
            .map(|(_, n)| (*n).max(1))
    })
}

fn extract_query(text: &str) -> String {
    let tail = QUERY_TAIL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c: char| c.is_whitespace() || ":,-".contains(c)))
        .filter(|t| !t.is_empty());
    match tail {
        Some(tail) => {
            let stripped = QUERY_LEAD.replace(tail, "");
            if stripped.trim().is_empty() {
                tail.to_string()
            } else {
                stripped.trim().to_string()
            }
        }
        None => text.trim().to_string(),
    }
}

fn extract_patient(text: &str, lower: &str, entities: &mut Entities) {
    let age = AGE_PREFIX
        .captures(lower)
        .or_else(|| AGE_SUFFIX.captures(lower))
        .and_then(|c| c[1].parse::<u64>().ok());
    if let Some(age) = age {
        entities.insert("age".into(), Value::from(age));
    }

    if FEMALE.is_match(lower) {
        entities.insert("sex".into(), Value::from("F"));
    } else if MALE.is_match(lower) {
        entities.insert("sex".into(), Value::from("M"));
    }

    let mut conditions: Vec<Value> = Vec::new();
    if lower.contains("diabet") {
        conditions.push("diabetes".into());
    }
    if lower.contains("hypertens") || lower.contains("high blood pressure") {
        conditions.push("hypertension".into());
    }
    if lower.contains("asthma") {
        conditions.push("asthma".into());
    }
    if lower.contains("lung cancer") {
        conditions.push("lung cancer".into());
    } else if lower.contains("breast cancer") {
        conditions.push("breast cancer".into());
    } else if lower.contains("cancer") {
        conditions.push("cancer".into());
    }
    if !conditions.is_empty() {
        entities.insert("conditions".into(), Value::Array(conditions));
    }

    let symptoms: Vec<Value> = SYMPTOMS
        .iter()
        .filter(|s| lower.contains(*s))
        .map(|s| Value::from(*s))
        .collect();
    if !symptoms.is_empty() {
        entities.insert("symptoms".into(), Value::Array(symptoms));
    }

    if let Some(m) = LOCATION.captures(text).and_then(|c| c.get(1)) {
        entities.insert("location".into(), Value::from(m.as_str()));
    }
}
