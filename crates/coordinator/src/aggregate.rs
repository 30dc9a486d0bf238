//! Folding step results into a [`Response`].

use medorch_common::{Intent, Response, StepResult, FAILURE_MARKER};
use serde_json::Value;
use std::collections::BTreeMap;

/// Build the response for a finished pipeline.
///
/// Every successful step contributes its output to the payload. The text
/// has one line per step in declaration order; failed steps carry
/// [`FAILURE_MARKER`]. When nothing succeeded the text collapses into a
/// single summary line.
pub fn aggregate(results: Vec<StepResult>, intent: &Intent) -> Response {
    let payload: BTreeMap<String, Value> = results
        .iter()
        .filter(|r| r.is_ok())
        .filter_map(|r| r.output.clone().map(|o| (r.agent_id.clone(), o)))
        .collect();
    let partial = results.iter().any(|r| !r.is_ok());

    let text = if results.is_empty() {
        format!("Nothing ran: no agents are routed for '{}'.", intent.verb())
    } else if results.iter().all(|r| !r.is_ok()) {
        let failed = results
            .iter()
            .map(|r| format!("{} ({})", r.agent_id, r.status))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} No agent produced a result: {}", FAILURE_MARKER, failed)
    } else {
        results.iter().map(render_line).collect::<Vec<_>>().join("\n")
    };

    Response {
        verb: intent.verb(),
        text,
        payload,
        partial,
        steps: results,
    }
}

fn render_line(result: &StepResult) -> String {
    match (&result.output, result.is_ok()) {
        (Some(output), true) => format!("[{}] {}", result.agent_id, render_value(output)),
        (None, true) => format!("[{}] (no output)", result.agent_id),
        (_, false) => format!(
            "[{}] {} {}: {}",
            result.agent_id,
            FAILURE_MARKER,
            result.status,
            result.detail.as_deref().unwrap_or("no detail")
        ),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medorch_common::{Entities, StepStatus, Verb};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn diagnose_intent() -> Intent {
        Intent::new("diagnose", Verb::Diagnose, Entities::new())
    }

    #[test]
    fn test_all_ok() {
        let response = aggregate(
            vec![StepResult::ok("diagnostics", json!("Likely bronchitis"), 3)],
            &diagnose_intent(),
        );
        assert_eq!(response.text, "[diagnostics] Likely bronchitis");
        assert_eq!(response.output("diagnostics"), Some(&json!("Likely bronchitis")));
        assert!(!response.partial);
        assert_eq!(response.verb, Verb::Diagnose);
    }

    #[test]
    fn test_partial_keeps_declaration_order() {
        let response = aggregate(
            vec![
                StepResult::ok("diagnostics", json!("Likely bronchitis"), 3),
                StepResult::failed("imaging", StepStatus::Timeout, "no response within 50 ms"),
                StepResult::ok("genomics", json!({"gene": "BRCA1"}), 1),
            ],
            &diagnose_intent(),
        );

        assert!(response.partial);
        assert_eq!(
            response.text.lines().collect::<Vec<_>>(),
            vec![
                "[diagnostics] Likely bronchitis",
                "[imaging] [unavailable] timeout: no response within 50 ms",
                r#"[genomics] {"gene":"BRCA1"}"#,
            ]
        );
        assert_eq!(response.payload.keys().collect::<Vec<_>>(), vec!["diagnostics", "genomics"]);
        assert_eq!(response.steps.len(), 3);
    }

    #[test]
    fn test_all_failed_collapses_to_summary() {
        let response = aggregate(
            vec![
                StepResult::failed("imaging", StepStatus::Unavailable, "disabled by configuration"),
                StepResult::failed("genomics", StepStatus::MissingInput, "no variant"),
            ],
            &diagnose_intent(),
        );
        assert!(response.partial);
        assert!(response.payload.is_empty());
        assert_eq!(response.text.lines().count(), 1);
        assert!(response.text.contains(FAILURE_MARKER));
        assert!(response.text.contains("imaging (unavailable)"));
        assert!(response.text.contains("genomics (missing input)"));
    }

    #[test]
    fn test_empty_pipeline() {
        let response = aggregate(Vec::new(), &diagnose_intent());
        assert!(!response.partial);
        assert!(response.text.starts_with("Nothing ran"));
    }
}
