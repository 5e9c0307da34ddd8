//! Project and sponsor catalogs.
//!
//! Semantic search and sponsor bookkeeping live outside the arena; these
//! traits are the seam. [`StaticCatalog`] serves both from memory (fixtures,
//! tests).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{HackathonContext, ProjectDetails, Sponsor};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("hackathon not found: {0}")]
    HackathonNotFound(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Search hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProject {
    pub project: ProjectDetails,
    pub similarity: f32,
}

/// Candidate project source.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    /// Projects scoring at least `threshold`, best first, at most `limit`.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> CatalogResult<Vec<ScoredProject>>;

    async fn project(&self, project_id: &str) -> CatalogResult<Option<ProjectDetails>>;
}

/// Sponsor source.
#[async_trait]
pub trait SponsorCatalog: Send + Sync {
    /// The hackathon and its sponsors.
    async fn hackathon(&self, hackathon_id: &str) -> CatalogResult<HackathonContext>;

    /// Reference documentation for one sponsor.
    async fn sponsor_docs(&self, sponsor: &Sponsor) -> CatalogResult<String>;
}

/// In-memory catalog, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub hackathons: Vec<HackathonContext>,
    #[serde(default)]
    pub projects: Vec<ProjectDetails>,
    /// Sponsor id to documentation text
    #[serde(default)]
    pub sponsor_docs: HashMap<String, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hackathon(mut self, hackathon: HackathonContext) -> Self {
        self.hackathons.push(hackathon);
        self
    }

    pub fn with_project(mut self, project: ProjectDetails) -> Self {
        self.projects.push(project);
        self
    }

    pub fn with_docs(mut self, sponsor_id: &str, docs: &str) -> Self {
        self.sponsor_docs
            .insert(sponsor_id.to_string(), docs.to_string());
        self
    }
}

/// Share of query words found in the project's text.
fn keyword_similarity(query: &str, project: &ProjectDetails) -> f32 {
    let haystack = format!(
        "{} {} {}",
        project.name,
        project.description.as_deref().unwrap_or_default(),
        project.readme.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let words: Vec<String> = query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    hits as f32 / words.len() as f32
}

#[async_trait]
impl ProjectCatalog for StaticCatalog {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> CatalogResult<Vec<ScoredProject>> {
        let mut hits: Vec<ScoredProject> = self
            .projects
            .iter()
            .map(|p| ScoredProject {
                similarity: keyword_similarity(query, p),
                project: p.clone(),
            })
            .filter(|hit| hit.similarity >= threshold)
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn project(&self, project_id: &str) -> CatalogResult<Option<ProjectDetails>> {
        Ok(self.projects.iter().find(|p| p.id == project_id).cloned())
    }
}

#[async_trait]
impl SponsorCatalog for StaticCatalog {
    async fn hackathon(&self, hackathon_id: &str) -> CatalogResult<HackathonContext> {
        self.hackathons
            .iter()
            .find(|h| h.hackathon_id == hackathon_id)
            .cloned()
            .ok_or_else(|| CatalogError::HackathonNotFound(hackathon_id.to_string()))
    }

    async fn sponsor_docs(&self, sponsor: &Sponsor) -> CatalogResult<String> {
        Ok(self
            .sponsor_docs
            .get(&sponsor.id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str, name: &str, description: &str) -> ProjectDetails {
        ProjectDetails {
            id: id.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            github_urls: vec![format!("https://github.com/acme/{id}")],
            devpost_url: None,
            readme: None,
            is_winner: false,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let catalog = StaticCatalog::new()
            .with_project(project("1", "Weather Bot", "chat bot for weather alerts"))
            .with_project(project("2", "Recipe Finder", "search recipes"))
            .with_project(project("3", "Alert Hub", "alerts dashboard"));

        let hits = catalog.search("weather alerts", 10, 0.5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.project.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(hits[0].similarity > hits[1].similarity);

        let limited = catalog.search("weather alerts", 1, 0.0).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_hackathon() {
        let err = StaticCatalog::new().hackathon("nope").await.unwrap_err();
        assert!(matches!(err, CatalogError::HackathonNotFound(_)));
    }

    #[test]
    fn test_loads_from_json() {
        let catalog: StaticCatalog = serde_json::from_str(
            r#"{
                "hackathons": [{"hackathon_id": "h1", "name": "Hack", "sponsors": [
                    {"id": "s1", "name": "Acme Maps"}
                ]}],
                "projects": [{"id": "p1", "name": "P", "github_urls": ["https://x/y.git"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.hackathons[0].sponsors[0].doc_urls.len(), 0);
        assert_eq!(catalog.projects[0].github_url(), Some("https://x/y.git"));
    }
}
