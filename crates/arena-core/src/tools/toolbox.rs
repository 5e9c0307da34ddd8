//! Tool dispatch for one tournament.

use std::sync::Arc;

use arena_sandbox::{truncate_chars, ExecutionEnvironmentManager, ValidationRequest};
use tracing::{debug, instrument};

use super::catalog::{ProjectCatalog, SponsorCatalog};
use super::{PlanStatus, ProjectDetailsView, ToolCall, ToolError, ToolOutput};
use crate::domain::{HackathonContext, ProjectSummary};
use crate::metrics::METRICS;

const SEARCH_DESCRIPTION_LIMIT: usize = 300;
const README_LIMIT: usize = 8000;

/// Executes parsed tool calls against the catalogs and the environment
/// manager. Shared by every agent of a tournament.
pub struct ToolBox {
    hackathon: Arc<HackathonContext>,
    projects: Arc<dyn ProjectCatalog>,
    sponsors: Arc<dyn SponsorCatalog>,
    environments: Arc<ExecutionEnvironmentManager>,
}

impl ToolBox {
    pub fn new(
        hackathon: Arc<HackathonContext>,
        projects: Arc<dyn ProjectCatalog>,
        sponsors: Arc<dyn SponsorCatalog>,
        environments: Arc<ExecutionEnvironmentManager>,
    ) -> Self {
        Self {
            hackathon,
            projects,
            sponsors,
            environments,
        }
    }

    pub fn hackathon(&self) -> &HackathonContext {
        &self.hackathon
    }

    #[instrument(skip(self, call), fields(tool = %call.kind()))]
    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        match call {
            ToolCall::SearchProjects(input) => {
                let hits = self
                    .projects
                    .search(
                        &input.query,
                        input.limit as usize,
                        input.similarity_threshold,
                    )
                    .await?;
                let projects: Vec<ProjectSummary> = hits
                    .into_iter()
                    .filter_map(|hit| {
                        let github_url = hit.project.github_url()?.to_string();
                        Some(ProjectSummary {
                            id: hit.project.id,
                            name: hit.project.name,
                            description: hit
                                .project
                                .description
                                .map(|d| truncate_chars(&d, SEARCH_DESCRIPTION_LIMIT)),
                            github_url,
                            similarity: hit.similarity,
                        })
                    })
                    .collect();
                debug!(query = %input.query, hits = projects.len(), "project search");
                Ok(ToolOutput::Projects {
                    count: projects.len(),
                    projects,
                })
            }
            ToolCall::GetProjectDetails(input) => {
                let project = self
                    .projects
                    .project(&input.project_id)
                    .await?
                    .ok_or_else(|| ToolError::NotFound {
                        what: "project",
                        id: input.project_id.clone(),
                    })?;
                Ok(ToolOutput::ProjectDetails(ProjectDetailsView {
                    github_url: project.github_url().map(str::to_string),
                    readme: project.readme.map(|r| truncate_chars(&r, README_LIMIT)),
                    id: project.id,
                    name: project.name,
                    description: project.description,
                    github_urls: project.github_urls,
                    devpost_url: project.devpost_url,
                    is_winner: project.is_winner,
                }))
            }
            ToolCall::FetchSponsorDocs(input) => {
                let sponsor = self
                    .hackathon
                    .sponsors
                    .iter()
                    .find(|s| s.id == input.sponsor_id)
                    .ok_or_else(|| ToolError::NotFound {
                        what: "sponsor",
                        id: input.sponsor_id.clone(),
                    })?;
                let docs = self.sponsors.sponsor_docs(sponsor).await?;
                Ok(ToolOutput::SponsorDocs {
                    sponsor_name: sponsor.name.clone(),
                    sponsor_description: sponsor.description.clone(),
                    docs,
                })
            }
            ToolCall::SubmitPlan(plan) => Ok(ToolOutput::PlanAccepted {
                status: PlanStatus::PlanSubmitted,
                plan: plan.clone(),
            }),
            ToolCall::WriteAndTestCode(input) => {
                METRICS.inc_validations();
                let result = self
                    .environments
                    .validate(ValidationRequest {
                        source_url: input.git_url.clone(),
                        files: input.files.clone(),
                        command: input.test_command.clone(),
                    })
                    .await?;
                Ok(ToolOutput::Validation(result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectDetails, Sponsor};
    use crate::tools::StaticCatalog;
    use arena_sandbox::fakes::{FakeProvider, ScriptedCommand};
    use arena_sandbox::EnvironmentConfig;
    use serde_json::json;

    fn toolbox(provider: FakeProvider) -> ToolBox {
        let hackathon = HackathonContext {
            hackathon_id: "h1".to_string(),
            name: "Hack".to_string(),
            sponsors: vec![Sponsor {
                id: "s1".to_string(),
                name: "Acme Maps".to_string(),
                description: Some("maps API".to_string()),
                doc_urls: vec![],
            }],
        };
        let catalog = StaticCatalog::new()
            .with_project(ProjectDetails {
                id: "p1".to_string(),
                name: "Weather Bot".to_string(),
                description: Some("w".repeat(400)),
                github_urls: vec!["https://github.com/acme/weather".to_string()],
                devpost_url: None,
                readme: Some("r".repeat(9000)),
                is_winner: true,
            })
            .with_project(ProjectDetails {
                id: "p2".to_string(),
                name: "Weather Station".to_string(),
                description: None,
                github_urls: vec![],
                devpost_url: None,
                readme: None,
                is_winner: false,
            })
            .with_docs("s1", "GET /tiles");
        let catalog = Arc::new(catalog);
        ToolBox::new(
            Arc::new(hackathon),
            catalog.clone(),
            catalog,
            Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(provider),
                EnvironmentConfig::default(),
            )),
        )
    }

    #[tokio::test]
    async fn test_search_skips_projects_without_repository() {
        let tools = toolbox(FakeProvider::new());
        let call = ToolCall::parse("search_projects", &json!({"query": "weather"})).unwrap();
        let out = tools.invoke(&call).await.unwrap().to_json();
        assert_eq!(out["count"], 1);
        assert_eq!(out["projects"][0]["id"], "p1");
        assert_eq!(
            out["projects"][0]["description"]
                .as_str()
                .unwrap()
                .chars()
                .count(),
            SEARCH_DESCRIPTION_LIMIT
        );
    }

    #[tokio::test]
    async fn test_details_truncate_readme() {
        let tools = toolbox(FakeProvider::new());
        let call = ToolCall::parse("get_project_details", &json!({"project_id": "p1"})).unwrap();
        let out = tools.invoke(&call).await.unwrap().to_json();
        assert_eq!(out["github_url"], "https://github.com/acme/weather");
        assert_eq!(out["readme"].as_str().unwrap().len(), README_LIMIT);
        assert_eq!(out["is_winner"], true);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let tools = toolbox(FakeProvider::new());
        let call = ToolCall::parse("get_project_details", &json!({"project_id": "zz"})).unwrap();
        assert!(matches!(
            tools.invoke(&call).await,
            Err(ToolError::NotFound { what: "project", .. })
        ));
        let call = ToolCall::parse("fetch_sponsor_docs", &json!({"sponsor_id": "s9"})).unwrap();
        assert!(matches!(
            tools.invoke(&call).await,
            Err(ToolError::NotFound { what: "sponsor", .. })
        ));
    }

    #[tokio::test]
    async fn test_sponsor_docs() {
        let tools = toolbox(FakeProvider::new());
        let call = ToolCall::parse("fetch_sponsor_docs", &json!({"sponsor_id": "s1"})).unwrap();
        let out = tools.invoke(&call).await.unwrap().to_json();
        assert_eq!(out["sponsor_name"], "Acme Maps");
        assert_eq!(out["docs"], "GET /tiles");
    }

    #[tokio::test]
    async fn test_code_tool_runs_validation() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_command("npm run build", ScriptedCommand::exit(2).with_stderr("tsc failed"));
        let tools = toolbox(provider.clone());
        let call = ToolCall::parse(
            "write_and_test_code",
            &json!({
                "git_url": "https://github.com/acme/weather",
                "files": [{"path": "src/maps.ts", "content": "export {}"}]
            }),
        )
        .unwrap();
        let out = tools.invoke(&call).await.unwrap().to_json();
        assert_eq!(out["success"], false);
        assert_eq!(out["exit_code"], 2);
        assert_eq!(out["stderr"], "tsc failed");
        assert_eq!(provider.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_provision_failure_is_tool_error() {
        let tools = toolbox(FakeProvider::new().failing_provision("repository not found"));
        let call = ToolCall::parse(
            "write_and_test_code",
            &json!({
                "git_url": "https://github.com/acme/missing",
                "files": [{"path": "a.js", "content": ""}]
            }),
        )
        .unwrap();
        let err = tools.invoke(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::Environment(_)));
    }
}
