//! Hackathon context: sponsors and candidate projects.

use serde::{Deserialize, Serialize};

/// An API vendor whose documentation agents integrate against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub doc_urls: Vec<String>,
}

/// A hackathon and its eligible sponsors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HackathonContext {
    pub hackathon_id: String,
    pub name: String,
    #[serde(default)]
    pub sponsors: Vec<Sponsor>,
}

/// Search hit for a candidate project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// First repository URL
    pub github_url: String,
    pub similarity: f32,
}

/// Full record of a candidate project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub github_urls: Vec<String>,
    #[serde(default)]
    pub devpost_url: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub is_winner: bool,
}

impl ProjectDetails {
    pub fn github_url(&self) -> Option<&str> {
        self.github_urls.first().map(String::as_str)
    }
}
