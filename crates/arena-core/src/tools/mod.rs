//! Agent tools.
//!
//! The five tools an agent may call are typed variants ([`ToolCall`],
//! [`ToolOutput`]) with declared input schemas ([`ToolSpec`]). Raw calls
//! from the reasoning engine are parsed with [`ToolCall::parse`] and
//! dispatched by [`ToolBox::invoke`].

pub mod catalog;
pub mod http_docs;
mod toolbox;

use std::collections::BTreeMap;

use arena_sandbox::{EnvError, ExecutionResult, FileChange};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::ProjectSummary;

pub use catalog::{CatalogError, ProjectCatalog, ScoredProject, SponsorCatalog, StaticCatalog};
pub use http_docs::HttpSponsorDocs;
pub use toolbox::ToolBox;

// ---------------------------------------------------------------------------
// Tool identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    SearchProjects,
    GetProjectDetails,
    FetchSponsorDocs,
    SubmitPlan,
    WriteAndTestCode,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::SearchProjects,
        ToolKind::GetProjectDetails,
        ToolKind::FetchSponsorDocs,
        ToolKind::SubmitPlan,
        ToolKind::WriteAndTestCode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchProjects => "search_projects",
            Self::GetProjectDetails => "get_project_details",
            Self::FetchSponsorDocs => "fetch_sponsor_docs",
            Self::SubmitPlan => "submit_plan",
            Self::WriteAndTestCode => "write_and_test_code",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn spec(&self) -> ToolSpec {
        let (capability, description, input, output) = match self {
            Self::SearchProjects => (
                ToolCapability::CatalogRead,
                "Search hackathon projects by meaning. Only projects with a repository are returned.",
                JsonFieldSchema::required(["query"]),
                JsonFieldSchema::required(["projects", "count"]),
            ),
            Self::GetProjectDetails => (
                ToolCapability::CatalogRead,
                "Full details of one project, including its readme.",
                JsonFieldSchema::required(["project_id"]),
                JsonFieldSchema::required(["id", "name", "github_urls"]),
            ),
            Self::FetchSponsorDocs => (
                ToolCapability::NetworkFetch,
                "Documentation of one sponsor's API.",
                JsonFieldSchema::required(["sponsor_id"]),
                JsonFieldSchema::required(["sponsor_name", "docs"]),
            ),
            Self::SubmitPlan => (
                ToolCapability::PlanWrite,
                "Submit the integration plan for the selected project and sponsor.",
                JsonFieldSchema::required([
                    "project_id",
                    "sponsor_id",
                    "project_name",
                    "sponsor_name",
                    "plan_summary",
                    "integration_approach",
                ]),
                JsonFieldSchema::required(["status"]),
            ),
            Self::WriteAndTestCode => (
                ToolCapability::ShellExec,
                "Clone the project, write the given files and run the test command in a fresh environment.",
                JsonFieldSchema::required(["git_url", "files"]),
                JsonFieldSchema::required(["success", "exit_code", "stdout", "stderr"]),
            ),
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            capability,
            input_schema: input,
            output_schema: output,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability class required by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    CatalogRead,
    NetworkFetch,
    PlanWrite,
    ShellExec,
}

/// Minimal JSON schema: required top-level fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonFieldSchema {
    pub required_fields: Vec<String>,
}

impl JsonFieldSchema {
    pub fn required<const N: usize>(fields: [&str; N]) -> Self {
        Self {
            required_fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// First required field missing from `payload`.
    pub fn missing_field(&self, payload: &Value) -> Option<&str> {
        self.required_fields
            .iter()
            .find(|f| payload.get(f.as_str()).is_none())
            .map(String::as_str)
    }
}

/// Declared tool, as advertised to reasoning engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub capability: ToolCapability,
    pub input_schema: JsonFieldSchema,
    pub output_schema: JsonFieldSchema,
}

/// Specs of every tool, in a stable order.
pub fn tool_specs() -> Vec<ToolSpec> {
    ToolKind::ALL.iter().map(ToolKind::spec).collect()
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

pub const SEARCH_LIMIT_MAX: u32 = 25;
pub const PLAN_SUMMARY_MAX: usize = 3000;
pub const INTEGRATION_APPROACH_MAX: usize = 2000;
pub const DEFAULT_TEST_COMMAND: &str = "npm run build";

fn default_search_limit() -> u32 {
    10
}

fn default_similarity_threshold() -> f32 {
    0.3
}

fn default_test_command() -> String {
    DEFAULT_TEST_COMMAND.to_string()
}

/// Accept ids given as JSON strings or numbers.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProjectsInput {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProjectDetailsInput {
    #[serde(deserialize_with = "id_string")]
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSponsorDocsInput {
    #[serde(deserialize_with = "id_string")]
    pub sponsor_id: String,
}

/// Integration plan: the target pair plus how the sponsor is wired in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPlanInput {
    #[serde(deserialize_with = "id_string")]
    pub project_id: String,
    #[serde(deserialize_with = "id_string")]
    pub sponsor_id: String,
    pub project_name: String,
    pub sponsor_name: String,
    pub plan_summary: String,
    pub integration_approach: String,
    #[serde(default)]
    pub api_endpoints_used: Vec<String>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAndTestCodeInput {
    pub git_url: String,
    pub files: Vec<FileChange>,
    #[serde(default = "default_test_command")]
    pub test_command: String,
}

impl WriteAndTestCodeInput {
    /// Path to full content; later entries for the same path win.
    pub fn changes(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect()
    }
}

/// A parsed, validated tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SearchProjects(SearchProjectsInput),
    GetProjectDetails(GetProjectDetailsInput),
    FetchSponsorDocs(FetchSponsorDocsInput),
    SubmitPlan(SubmitPlanInput),
    WriteAndTestCode(WriteAndTestCodeInput),
}

impl ToolCall {
    /// Parse a raw call by tool name. Checks required fields, types and
    /// value bounds.
    pub fn parse(name: &str, input: &Value) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool {
            tool_name: name.to_string(),
        })?;
        if let Some(field) = kind.spec().input_schema.missing_field(input) {
            return Err(ToolError::SchemaViolation {
                tool_name: name.to_string(),
                field: field.to_string(),
            });
        }

        let invalid = |reason: String| ToolError::InvalidInput {
            tool_name: name.to_string(),
            reason,
        };
        let decode = |input: &Value| -> Result<ToolCall, serde_json::Error> {
            let input = input.clone();
            Ok(match kind {
                ToolKind::SearchProjects => Self::SearchProjects(serde_json::from_value(input)?),
                ToolKind::GetProjectDetails => {
                    Self::GetProjectDetails(serde_json::from_value(input)?)
                }
                ToolKind::FetchSponsorDocs => {
                    Self::FetchSponsorDocs(serde_json::from_value(input)?)
                }
                ToolKind::SubmitPlan => Self::SubmitPlan(serde_json::from_value(input)?),
                ToolKind::WriteAndTestCode => {
                    Self::WriteAndTestCode(serde_json::from_value(input)?)
                }
            })
        };
        let call = decode(input).map_err(|e| invalid(e.to_string()))?;

        match &call {
            Self::SearchProjects(i) => {
                if !(1..=SEARCH_LIMIT_MAX).contains(&i.limit) {
                    return Err(invalid(format!("limit must be in 1..={SEARCH_LIMIT_MAX}")));
                }
                if !(0.0..=1.0).contains(&i.similarity_threshold) {
                    return Err(invalid("similarity_threshold must be in 0..=1".to_string()));
                }
            }
            Self::SubmitPlan(i) => {
                if i.plan_summary.chars().count() > PLAN_SUMMARY_MAX {
                    return Err(invalid(format!(
                        "plan_summary exceeds {PLAN_SUMMARY_MAX} characters"
                    )));
                }
                if i.integration_approach.chars().count() > INTEGRATION_APPROACH_MAX {
                    return Err(invalid(format!(
                        "integration_approach exceeds {INTEGRATION_APPROACH_MAX} characters"
                    )));
                }
            }
            Self::WriteAndTestCode(i) => {
                if i.files.is_empty() {
                    return Err(invalid("files must contain at least one entry".to_string()));
                }
            }
            Self::GetProjectDetails(_) | Self::FetchSponsorDocs(_) => {}
        }
        Ok(call)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::SearchProjects(_) => ToolKind::SearchProjects,
            Self::GetProjectDetails(_) => ToolKind::GetProjectDetails,
            Self::FetchSponsorDocs(_) => ToolKind::FetchSponsorDocs,
            Self::SubmitPlan(_) => ToolKind::SubmitPlan,
            Self::WriteAndTestCode(_) => ToolKind::WriteAndTestCode,
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetailsView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub github_url: Option<String>,
    pub github_urls: Vec<String>,
    pub devpost_url: Option<String>,
    pub readme: Option<String>,
    pub is_winner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    PlanSubmitted,
}

/// Result of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Projects {
        projects: Vec<ProjectSummary>,
        count: usize,
    },
    ProjectDetails(ProjectDetailsView),
    SponsorDocs {
        sponsor_name: String,
        sponsor_description: Option<String>,
        docs: String,
    },
    PlanAccepted {
        status: PlanStatus,
        #[serde(flatten)]
        plan: SubmitPlanInput,
    },
    Validation(ExecutionResult),
}

impl ToolOutput {
    /// JSON rendering handed back to the engine and kept on the step.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failed tool call. Always reported back to the engine as data.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("tool {tool_name}: missing required field '{field}'")]
    SchemaViolation { tool_name: String, field: String },

    #[error("tool {tool_name}: invalid input: {reason}")]
    InvalidInput { tool_name: String, reason: String },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("environment error: {0}")]
    Environment(#[from] EnvError),
}
