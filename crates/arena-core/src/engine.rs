//! Reasoning engine seam.
//!
//! The per-step reasoning of an agent is external. An engine receives the
//! system prompt, the declared tool set and the transcript so far and answers
//! with optional text and zero or more tool calls; a turn without tool calls
//! ends the run.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::Personality;
use crate::tools::ToolSpec;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("reasoning engine unavailable: {0}")]
    Unavailable(String),

    #[error("reasoning engine call failed: {0}")]
    Call(String),
}

/// Tool call requested by the engine, not yet validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Engine-assigned correlation id
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolInvocation {
    pub fn new(name: &str, input: Value) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            input,
        }
    }
}

/// One engine response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineTurn {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}

/// Conversation history handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        output: Value,
        is_error: bool,
    },
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn next_turn(
        &mut self,
        system_prompt: &str,
        tools: &[ToolSpec],
        transcript: &[TranscriptEntry],
    ) -> Result<EngineTurn, EngineError>;
}

/// Builds one engine per agent.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        agent_number: u32,
        personality: &Personality,
    ) -> Result<Box<dyn ReasoningEngine>, EngineError>;
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// One scripted engine step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedTurn {
    Turn(EngineTurn),
    Fail { message: String },
    Panic { message: String },
}

impl ScriptedTurn {
    pub fn text(text: &str) -> Self {
        Self::Turn(EngineTurn {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        })
    }

    pub fn call(name: &str, input: Value) -> Self {
        Self::Turn(EngineTurn {
            text: None,
            tool_calls: vec![ToolInvocation::new(name, input)],
        })
    }

    pub fn calls(calls: Vec<ToolInvocation>) -> Self {
        Self::Turn(EngineTurn {
            text: None,
            tool_calls: calls,
        })
    }

    pub fn fail(message: &str) -> Self {
        Self::Fail {
            message: message.to_string(),
        }
    }
}

/// Replays a fixed list of turns, then ends the run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    turns: VecDeque<ScriptedTurn>,
    calls_seen: usize,
}

impl ScriptedEngine {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: turns.into(),
            calls_seen: 0,
        }
    }

    /// Replays `turn` `times` times.
    pub fn repeating(turn: EngineTurn, times: usize) -> Self {
        Self::new(vec![ScriptedTurn::Turn(turn); times])
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn next_turn(
        &mut self,
        _system_prompt: &str,
        _tools: &[ToolSpec],
        _transcript: &[TranscriptEntry],
    ) -> Result<EngineTurn, EngineError> {
        self.calls_seen += 1;
        let mut turn = match self.turns.pop_front() {
            None => return Ok(EngineTurn::default()),
            Some(ScriptedTurn::Turn(turn)) => turn,
            Some(ScriptedTurn::Fail { message }) => return Err(EngineError::Call(message)),
            Some(ScriptedTurn::Panic { message }) => panic!("{message}"),
        };
        for (idx, call) in turn.tool_calls.iter_mut().enumerate() {
            if call.id.is_empty() {
                call.id = format!("call-{}-{idx}", self.calls_seen);
            }
        }
        Ok(turn)
    }
}

/// Hands out scripts by agent number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedEngineFactory {
    /// Script for agents without their own entry
    #[serde(default)]
    pub default_script: Vec<ScriptedTurn>,
    #[serde(default)]
    pub scripts: HashMap<u32, Vec<ScriptedTurn>>,
    /// Agents for which no engine can be built
    #[serde(default)]
    pub unavailable: HashSet<u32>,
}

impl ScriptedEngineFactory {
    pub fn new(default_script: Vec<ScriptedTurn>) -> Self {
        Self {
            default_script,
            ..Self::default()
        }
    }

    pub fn with_script(mut self, agent_number: u32, script: Vec<ScriptedTurn>) -> Self {
        self.scripts.insert(agent_number, script);
        self
    }

    pub fn with_unavailable(mut self, agent_number: u32) -> Self {
        self.unavailable.insert(agent_number);
        self
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(
        &self,
        agent_number: u32,
        _personality: &Personality,
    ) -> Result<Box<dyn ReasoningEngine>, EngineError> {
        if self.unavailable.contains(&agent_number) {
            return Err(EngineError::Unavailable(format!(
                "no engine for agent {agent_number}"
            )));
        }
        let script = self
            .scripts
            .get(&agent_number)
            .unwrap_or(&self.default_script)
            .clone();
        Ok(Box::new(ScriptedEngine::new(script)))
    }
}
