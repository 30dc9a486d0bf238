//! End-to-end tests: free text in, aggregated response out, using the
//! built-in agents.

use medorch_agents::builtin_registrations;
use medorch_common::{DispatchError, RouterError, StepStatus, Verb, FAILURE_MARKER};
use medorch_coordinator::{AgentStatus, FanoutPolicy, Router, RouterConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn router() -> Router {
    Router::new(RouterConfig::default(), builtin_registrations()).unwrap()
}

fn router_with(config: RouterConfig) -> Router {
    Router::new(config, builtin_registrations()).unwrap()
}

// ============================================================================
// Single-Agent Requests
// ============================================================================

#[tokio::test]
async fn test_diagnose_free_text() {
    let router = router();
    let response = router
        .route("diagnose a 55 yo female with chest pain and cough", None)
        .await
        .unwrap();

    assert_eq!(response.verb, Verb::Diagnose);
    assert!(!response.partial);
    assert_eq!(response.payload.keys().collect::<Vec<_>>(), vec!["diagnostics"]);
    let text = response.output("diagnostics").unwrap().as_str().unwrap();
    assert!(text.starts_with("Patient: 55-year-old female."));
    assert!(response.text.starts_with("[diagnostics] Patient: 55-year-old female."));
}

#[tokio::test]
async fn test_synthesize_count() {
    let response = router()
        .route("create two synthetic patients", None)
        .await
        .unwrap();
    assert_eq!(response.verb, Verb::Synthesize);
    assert_eq!(response.output("data_synthesis").unwrap().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_default_synthetic_count_from_config() {
    let mut config = RouterConfig::default();
    config.routing.default_synthetic_count = 3;
    let response = router_with(config)
        .route("generate synthetic patients", None)
        .await
        .unwrap();
    assert_eq!(response.output("data_synthesis").unwrap().as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_trials_for_parsed_patient() {
    let response = router()
        .route("find clinical trials for a 65 yo male with lung cancer in Boston", None)
        .await
        .unwrap();
    assert_eq!(response.verb, Verb::MatchTrials);
    let trials = response.output("trial_matching").unwrap().as_array().unwrap();
    assert_eq!(trials[0]["id"], "NCT-LC-0005");
}

// ============================================================================
// Multi-Agent Pipelines
// ============================================================================

#[tokio::test]
async fn test_diagnose_fans_out_to_imaging_and_genomics() {
    let response = router()
        .route(
            "diagnose a 47 yo female with cough and fever, image cxr_pneumonia.png, variant BRCA1 5382insC",
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = response.steps.iter().map(|s| s.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["diagnostics", "imaging", "genomics"]);
    assert!(!response.partial);

    let impression = response.output("diagnostics").unwrap().as_str().unwrap();
    assert!(impression.contains("pneumonia"));
    assert!(impression.contains("classified as pathogenic"));
    assert_eq!(response.output("genomics").unwrap()["gene"], "BRCA1");
}

#[tokio::test]
async fn test_fanout_always_surfaces_missing_input() {
    let mut config = RouterConfig::default();
    config.routing.diagnose_fanout = FanoutPolicy::Always;
    let response = router_with(config)
        .route("diagnose a 30 yo man with headache", None)
        .await
        .unwrap();

    assert!(response.partial);
    assert!(response.step("diagnostics").unwrap().is_ok());
    assert_eq!(response.step("imaging").unwrap().status, StepStatus::MissingInput);
    assert_eq!(response.step("genomics").unwrap().status, StepStatus::MissingInput);
    assert!(response.text.contains(&format!("[imaging] {} missing input", FAILURE_MARKER)));
}

#[tokio::test]
async fn test_run_pipeline_with_json_entities() {
    let router = router();
    let intent = router.parse(r#"run full pipeline on {"age":60,"sex":"male"}"#);
    assert_eq!(intent.verb(), Verb::RunPipeline);
    assert_eq!(intent.entities().len(), 2);

    let response = router
        .route(r#"run full pipeline on {"age":60,"sex":"male"}"#, None)
        .await
        .unwrap();

    let ids: Vec<&str> = response.steps.iter().map(|s| s.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["data_synthesis", "diagnostics", "trial_matching"]);
    assert!(!response.partial, "{}", response.text);
    let impression = response.output("diagnostics").unwrap().as_str().unwrap();
    assert!(impression.contains("60-year-old male"));
    assert!(impression.contains("synthetic cohort of 1"));
}

#[tokio::test]
async fn test_run_pipeline_free_text_patient() {
    let router = router();
    let response = router
        .route("run full pipeline for a 72 yo woman with diabetes", None)
        .await
        .unwrap();

    assert!(!response.partial, "{}", response.text);
    assert_eq!(response.output("data_synthesis").unwrap().as_array().unwrap().len(), 1);
    let impression = response.output("diagnostics").unwrap().as_str().unwrap();
    assert!(impression.starts_with("Patient: 72-year-old female."));
    assert!(impression.contains("synthetic cohort of 1"));

    // An age is never read as a cohort size.
    let response = router
        .route("run full pipeline for a patient age 150", None)
        .await
        .unwrap();
    assert_eq!(response.step("data_synthesis").unwrap().status, StepStatus::Ok);
    assert_eq!(response.output("data_synthesis").unwrap().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_pipeline_with_downstream_text_agents() {
    let response = router()
        .route(
            r#"run all {"age": 72, "sex": "F", "conditions": ["diabetes"], "agents": ["synthesize", "diagnose", "suggest_drugs", "search_literature", "check_ethics"]}"#,
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = response.steps.iter().map(|s| s.agent_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "data_synthesis",
            "diagnostics",
            "drug_discovery",
            "literature_surveillance",
            "ethical_monitoring"
        ]
    );
    assert!(!response.partial, "{}", response.text);
    assert_eq!(response.output("drug_discovery").unwrap()["candidates"][0]["name"], "Metformin");
    let audit = response.output("ethical_monitoring").unwrap();
    assert_eq!(audit["entries_checked"], 0);
    assert!(audit["selection_rate_by_group"].is_object());
}

#[tokio::test]
async fn test_new_capabilities_from_free_text() {
    let router = router();

    let drugs = router.route("suggest drugs for breast cancer", None).await.unwrap();
    assert_eq!(drugs.verb, Verb::SuggestDrugs);
    assert_eq!(drugs.output("drug_discovery").unwrap()["candidates"][0]["name"], "Tamoxifen");

    let plan = router
        .route("treatment plan for a 50 yo female with hypertension", None)
        .await
        .unwrap();
    assert_eq!(plan.output("treatment_optimization").unwrap()["dose"], "Medium dose");

    let papers = router
        .route("search literature for lung cancer immunotherapy", None)
        .await
        .unwrap();
    let citations = papers.output("literature_surveillance").unwrap()["citations"].clone();
    assert!(citations[0].as_str().unwrap().starts_with("Reck et al."));

    let audit = router
        .route(r#"ethics check on ["decisionA", "racial disparity in triage"]"#, None)
        .await
        .unwrap();
    assert_eq!(
        audit.output("ethical_monitoring").unwrap()["verdict"],
        "Potential bias detected. See audit logs."
    );

    // No log list: the audit has nothing to read.
    let bare = router.route("run an ethics audit", None).await.unwrap();
    assert_eq!(bare.step("ethical_monitoring").unwrap().status, StepStatus::MissingInput);
}

#[tokio::test]
async fn test_run_pipeline_subset() {
    let response = router()
        .route(
            r#"run all {"age": 50, "conditions": ["diabetes"], "agents": ["match_trials", "plan_diet"]}"#,
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = response.steps.iter().map(|s| s.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["trial_matching", "diet_planner"]);
    assert!(!response.partial);
    assert_eq!(
        response.output("trial_matching").unwrap()[0]["id"],
        json!("NCT-DM-0001")
    );
}

// ============================================================================
// Rejections and Degradation
// ============================================================================

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let err = router()
        .route("run full pipeline on {bad json", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Parse { ref fragment, .. } if fragment == "{bad json"));
}

#[tokio::test]
async fn test_unknown_request_is_rejected() {
    let err = router().route("what's the weather", None).await.unwrap_err();
    assert!(matches!(err, RouterError::Dispatch(DispatchError::UnknownVerb(_))));
}

#[tokio::test]
async fn test_disabled_agent_degrades_pipeline() {
    let config = RouterConfig {
        disabled_agents: vec!["data_synthesis".into()],
        ..Default::default()
    };
    let router = router_with(config);
    let response = router.route("run the full pipeline", None).await.unwrap();

    assert!(response.partial);
    assert_eq!(response.step("data_synthesis").unwrap().status, StepStatus::Unavailable);
    // The optional cohort binding is simply left out downstream.
    assert!(response.step("diagnostics").unwrap().is_ok());
    assert!(response.step("trial_matching").unwrap().is_ok());
    assert_eq!(
        response.text.lines().next().unwrap(),
        format!("[data_synthesis] {} unavailable: disabled by configuration", FAILURE_MARKER)
    );
}

#[tokio::test]
async fn test_agent_invalid_input_is_internal_failure() {
    let response = router()
        .route("create 500 synthetic patients", None)
        .await
        .unwrap();
    let step = response.step("data_synthesis").unwrap();
    assert_eq!(step.status, StepStatus::InternalFailure);
    assert!(step.detail.as_deref().unwrap().starts_with("invalid input:"));
    assert!(response.text.contains(FAILURE_MARKER));
}

// ============================================================================
// Sessions, Idempotence and Sharing
// ============================================================================

#[tokio::test]
async fn test_counsel_session_continuity() {
    let router = router();
    router.route("I feel anxious", Some("alice")).await.unwrap();
    let second = router.route("still worried today", Some("alice")).await.unwrap();
    let other = router.route("I feel anxious", Some("bob")).await.unwrap();

    let reply = second.output("mental_health").unwrap().as_str().unwrap();
    assert!(reply.contains("Earlier you mentioned \"I feel anxious\""));
    let fresh = other.output("mental_health").unwrap().as_str().unwrap();
    assert!(!fresh.contains("Earlier"));

    assert_eq!(router.sessions().get("alice").await.unwrap().len().await, 4);
    assert_eq!(router.sessions().get("bob").await.unwrap().len().await, 2);
}

#[tokio::test]
async fn test_identical_requests_are_idempotent() {
    let router = router();
    let text = r#"run full pipeline on {"age": 58, "sex": "F", "conditions": ["hypertension"], "count": 3}"#;
    let first = router.route(text, None).await.unwrap();
    let second = router.route(text, None).await.unwrap();
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.text, second.text);
}

#[tokio::test]
async fn test_shared_router_serves_concurrent_requests() {
    let router = Arc::new(router());
    let requests = [
        "diagnose a 55 yo female with chest pain and cough",
        "create 3 synthetic patients",
        "analyze variant BRCA1 5382insC",
        "diet plan for a 60 yo male with diabetes",
    ];

    let handles = requests.iter().cycle().take(16).map(|text| {
        let router = router.clone();
        let text = text.to_string();
        tokio::spawn(async move { router.route(&text, None).await })
    });
    for result in futures::future::join_all(handles).await {
        assert!(!result.unwrap().unwrap().partial);
    }

    let ready: Vec<String> = router
        .agents()
        .into_iter()
        .filter(|a| a.status == AgentStatus::Ready)
        .map(|a| a.id)
        .collect();
    assert_eq!(ready, vec!["data_synthesis", "diagnostics", "genomics", "diet_planner"]);
}

#[tokio::test]
async fn test_self_test_passes_with_builtin_agents() {
    let router = router();
    let report = router.self_test().await;
    assert_eq!(report.checks.len(), 11);
    assert!(report.passed(), "{:?}", report.failures().collect::<Vec<_>>());
    assert!(router.sessions().is_empty().await);
}

#[tokio::test]
async fn test_router_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "step_timeout_ms = 2000\ndisabled_agents = [\"imaging\"]").unwrap();

    let config = RouterConfig::from_file(file.path()).unwrap();
    let router = router_with(config);
    assert_eq!(router.registry().lookup("imaging").unwrap().status, AgentStatus::Unavailable);

    let response = router.route("analyze image knee_fracture.png", None).await.unwrap();
    assert!(response.partial);
    assert!(response.text.starts_with(FAILURE_MARKER));
}
