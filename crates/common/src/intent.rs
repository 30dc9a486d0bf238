//! Structured interpretation of a free-text request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Named arguments extracted from a request. Ordered so that identical
/// requests serialize identically.
pub type Entities = BTreeMap<String, Value>;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Synthesize,
    Diagnose,
    MatchTrials,
    RunPipeline,
    AnalyzeImaging,
    AnalyzeVariant,
    PlanDiet,
    Counsel,
    SuggestDrugs,
    PlanTreatment,
    SearchLiterature,
    CheckEthics,
    Unknown,
    ParseError,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Synthesize => "synthesize",
            Verb::Diagnose => "diagnose",
            Verb::MatchTrials => "match_trials",
            Verb::RunPipeline => "run_pipeline",
            Verb::AnalyzeImaging => "analyze_imaging",
            Verb::AnalyzeVariant => "analyze_variant",
            Verb::PlanDiet => "plan_diet",
            Verb::Counsel => "counsel",
            Verb::SuggestDrugs => "suggest_drugs",
            Verb::PlanTreatment => "plan_treatment",
            Verb::SearchLiterature => "search_literature",
            Verb::CheckEthics => "check_ethics",
            Verb::Unknown => "unknown",
            Verb::ParseError => "parse_error",
        }
    }

    /// Look a verb up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        let verb = match name {
            "synthesize" => Verb::Synthesize,
            "diagnose" => Verb::Diagnose,
            "match_trials" => Verb::MatchTrials,
            "run_pipeline" => Verb::RunPipeline,
            "analyze_imaging" => Verb::AnalyzeImaging,
            "analyze_variant" => Verb::AnalyzeVariant,
            "plan_diet" => Verb::PlanDiet,
            "counsel" => Verb::Counsel,
            "suggest_drugs" => Verb::SuggestDrugs,
            "plan_treatment" => Verb::PlanTreatment,
            "search_literature" => Verb::SearchLiterature,
            "check_ethics" => Verb::CheckEthics,
            "unknown" => Verb::Unknown,
            "parse_error" => Verb::ParseError,
            _ => return None,
        };
        Some(verb)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics kept when an embedded JSON object fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// The brace-delimited substring that was rejected.
    pub fragment: String,
    /// Decoder message.
    pub message: String,
}

/// A parsed request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    raw_text: String,
    verb: Verb,
    entities: Entities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parse_failure: Option<ParseFailure>,
}

impl Intent {
    pub fn new(raw_text: impl Into<String>, verb: Verb, entities: Entities) -> Self {
        Self {
            raw_text: raw_text.into(),
            verb,
            entities,
            parse_failure: None,
        }
    }

    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self::new(raw_text, Verb::Unknown, Entities::new())
    }

    pub fn parse_error(raw_text: impl Into<String>, failure: ParseFailure) -> Self {
        Self {
            raw_text: raw_text.into(),
            verb: Verb::ParseError,
            entities: Entities::new(),
            parse_failure: Some(failure),
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&Value> {
        self.entities.get(name)
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn parse_failure(&self) -> Option<&ParseFailure> {
        self.parse_failure.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verb_names_roundtrip() {
        for verb in [
            Verb::Synthesize,
            Verb::Diagnose,
            Verb::MatchTrials,
            Verb::RunPipeline,
            Verb::AnalyzeImaging,
            Verb::AnalyzeVariant,
            Verb::PlanDiet,
            Verb::Counsel,
            Verb::SuggestDrugs,
            Verb::PlanTreatment,
            Verb::SearchLiterature,
            Verb::CheckEthics,
            Verb::Unknown,
            Verb::ParseError,
        ] {
            assert_eq!(Verb::from_name(verb.as_str()), Some(verb));
            let wire = serde_json::to_value(verb).unwrap();
            assert_eq!(wire, json!(verb.as_str()));
        }
        assert_eq!(Verb::from_name("teleport"), None);
    }

    #[test]
    fn test_parse_error_intent_keeps_fragment() {
        let intent = Intent::parse_error(
            "run full pipeline on {bad json",
            ParseFailure {
                fragment: "{bad json".into(),
                message: "key must be a string".into(),
            },
        );
        assert_eq!(intent.verb(), Verb::ParseError);
        assert!(intent.entities().is_empty());
        assert_eq!(intent.parse_failure().unwrap().fragment, "{bad json");
    }
}
