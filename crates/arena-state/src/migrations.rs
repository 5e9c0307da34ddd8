//! SurrealDB schema migrations and initialization
//!
//! Sets up the arena tables with their unique indexes. Safe to call on every
//! connection.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all arena tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing arena SurrealDB schema");

    init_tournaments_table(db).await?;
    init_agent_runs_table(db).await?;
    init_agent_steps_table(db).await?;

    info!("arena schema initialization complete");
    Ok(())
}

/// Initialize `tournaments` table
///
/// Schema:
/// ```text
/// TABLE tournaments {
///   tournament_id:        STRING (unique)
///   hackathon_id:         STRING (indexed)
///   status:               STRING (pending | running | evaluating | completed | failed)
///   agent_count:          INT
///   config:               OBJECT
///   created_at:           DATETIME
///   started_at:           DATETIME?
///   completed_at:         DATETIME?
///   winner_agent_run_id:  STRING?
/// }
/// ```
async fn init_tournaments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tournaments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS tournaments SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_tournament_id ON TABLE tournaments COLUMNS tournament_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_hackathon_id ON TABLE tournaments COLUMNS hackathon_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ tournaments table initialized");
    Ok(())
}

/// Initialize `agent_runs` table
///
/// Constraints:
/// - `agent_run_id` is unique
/// - `(tournament_id, agent_number)` is unique
/// - terminal runs are immutable (enforced via app logic)
async fn init_agent_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agent_runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_runs SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_run_id ON TABLE agent_runs COLUMNS agent_run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_tournament_agent_number ON TABLE agent_runs COLUMNS tournament_id, agent_number UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ agent_runs table initialized");
    Ok(())
}

/// Initialize `agent_steps` table
///
/// Append-only. `(agent_run_id, seq)` is unique.
async fn init_agent_steps_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agent_steps table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_steps SCHEMALESS
            PERMISSIONS
                FOR select, create FULL
                FOR update, delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_run_id_seq ON TABLE agent_steps COLUMNS agent_run_id, seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_run_id ON TABLE agent_steps COLUMNS agent_run_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ agent_steps table initialized");
    Ok(())
}
