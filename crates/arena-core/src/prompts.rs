//! Prompt construction.

use std::fmt::Write;

use crate::domain::{HackathonContext, Personality};

/// First user message of every agent run.
pub const INITIAL_PROMPT: &str = "Begin your hackathon agent run. Search for projects, select one, \
research the sponsor, then create and submit your integration plan.";

/// System prompt: the personality's bias followed by the task, the
/// hackathon's sponsors and the rules.
pub fn system_prompt(personality: &Personality, hackathon: &HackathonContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(personality.system_prompt);
    prompt.push_str("\n\n");
    let _ = writeln!(
        prompt,
        "You are an agent competing in the \"{}\" hackathon tournament. Pick an existing \
hackathon project, integrate one sponsor's API into it, and prove the change builds.",
        hackathon.name
    );
    prompt.push_str(
        "\n## Steps\n\
1. Use search_projects to find candidate projects.\n\
2. Use get_project_details to inspect the most promising ones.\n\
3. Use fetch_sponsor_docs to study the sponsor you want to integrate.\n\
4. Use submit_plan to record your project, sponsor and integration approach.\n\
5. Use write_and_test_code to write the integration and run the project's build.\n",
    );
    prompt.push_str("\n## Available Sponsors\n");
    for sponsor in &hackathon.sponsors {
        let _ = writeln!(
            prompt,
            "- {} (ID: {}): {}",
            sponsor.name,
            sponsor.id,
            sponsor.description.as_deref().unwrap_or("No description")
        );
    }
    prompt.push_str(
        "\n## Rules\n\
- Submit exactly one plan before writing code; later plans are acknowledged but ignored.\n\
- Only projects with a repository can be modified.\n\
- Your run succeeds once a build passes after your plan was submitted.\n\
- You have a limited number of turns.\n",
    );
    prompt
}
