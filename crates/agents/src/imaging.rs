//! Imaging agent - reads imaging study references.
//!
//! Works offline from the study's file name: the extension decides the
//! container, keywords in the name decide modality and findings.

use crate::args::required_str;
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

pub const ID: &str = "imaging";

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "dcm"];

/// Keyword in the file name → finding reported for it.
const FINDING_KEYWORDS: &[(&str, &str)] = &[
    ("pneumonia", "focal consolidation consistent with pneumonia"),
    ("nodule", "solitary pulmonary nodule; follow-up CT advised"),
    ("fracture", "cortical discontinuity suggesting fracture"),
    ("effusion", "blunted costophrenic angle suggesting pleural effusion"),
    ("mass", "space-occupying lesion; tissue sampling advised"),
];

pub struct ImagingAgent;

impl ImagingAgent {
    pub fn new() -> Self {
        Self
    }

    /// Describe a study from its path.
    pub fn analyze(&self, report: &str) -> Result<Value, AgentError> {
        let path = Path::new(report);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AgentError::InvalidInput(format!(
                "unsupported imaging file '{}' (expected one of: {})",
                report,
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let modality = if name.contains("mri") {
            "MRI"
        } else if name.contains("ct") && !name.contains("cxr") {
            "CT"
        } else if name.contains("xray") || name.contains("x-ray") || name.contains("cxr") {
            "X-ray"
        } else if extension == "dcm" {
            "DICOM study"
        } else {
            "photograph"
        };

        let mut findings: Vec<&str> = FINDING_KEYWORDS
            .iter()
            .filter(|(keyword, _)| name.contains(keyword))
            .map(|(_, finding)| *finding)
            .collect();
        if findings.is_empty() {
            findings.push("no acute abnormality identified");
        }

        Ok(json!({
            "source": report,
            "modality": modality,
            "findings": findings,
        }))
    }
}

impl Default for ImagingAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ImagingAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let report = required_str(args, "report")?;
        info!(agent = ID, report = %report, "Analyzing imaging study");
        self.analyze(report)
    }
}
