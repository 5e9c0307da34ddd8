//! SurrealDB row types
//!
//! Rows mirror the records in `storage_traits` but store statuses as plain
//! strings and timestamps as SurrealDB datetimes. Conversion happens in
//! `surreal_store`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Row in the `tournaments` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub tournament_id: String,
    pub hackathon_id: String,
    /// "pending" | "running" | "evaluating" | "completed" | "failed"
    pub status: String,
    pub agent_count: u32,
    pub config: serde_json::Value,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    pub winner_agent_run_id: Option<String>,
}

impl TournamentRow {
    /// Create a new row in "pending" state
    pub fn new(
        tournament_id: String,
        hackathon_id: String,
        agent_count: u32,
        config: serde_json::Value,
    ) -> Self {
        TournamentRow {
            id: None,
            tournament_id,
            hackathon_id,
            status: "pending".to_string(),
            agent_count,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            winner_agent_run_id: None,
        }
    }
}

/// Row in the `agent_runs` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_run_id: String,
    pub tournament_id: String,
    pub agent_number: u32,
    pub personality: String,
    pub status: String,
    pub selected_project_id: Option<String>,
    pub selected_sponsor_id: Option<String>,
    pub plan: Option<String>,
    pub code_changes: Option<BTreeMap<String, String>>,
    /// Serialized `ValidationSnapshot`
    pub validation: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl AgentRunRow {
    /// Create a new row in "pending" state
    pub fn new(
        agent_run_id: String,
        tournament_id: String,
        agent_number: u32,
        personality: String,
    ) -> Self {
        let now = Utc::now();
        AgentRunRow {
            id: None,
            agent_run_id,
            tournament_id,
            agent_number,
            personality,
            status: "pending".to_string(),
            selected_project_id: None,
            selected_sponsor_id: None,
            plan: None,
            code_changes: None,
            validation: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Row in the `agent_steps` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_run_id: String,
    pub seq: u64,
    pub kind: String,
    pub tool_name: Option<String>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub duration_ms: Option<u64>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}
