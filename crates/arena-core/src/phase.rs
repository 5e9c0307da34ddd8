//! Agent phase projection.
//!
//! An agent's status is a pure function of its previous status and the tool
//! call that just fired. The projection never lowers the rank of a status
//! and never leaves a terminal one.

use arena_state::AgentRunStatus;

use crate::tools::ToolKind;

/// Point in a tool call's life at which the projection is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Start,
    Success,
    Failure,
}

/// Status implied by `tool` reaching `phase`, given the `previous` status.
///
/// | tool                                   | start        | success      |
/// |----------------------------------------|--------------|--------------|
/// | `search_projects`, `get_project_details` | selecting  | selecting    |
/// | `fetch_sponsor_docs`                   | researching  | researching  |
/// | `submit_plan`                          | -            | planning     |
/// | `write_and_test_code`                  | coding       | testing      |
///
/// A failed call never moves the status. Candidates that would lower the
/// rank of `previous` are ignored.
pub fn next_status(previous: AgentRunStatus, tool: ToolKind, phase: CallPhase) -> AgentRunStatus {
    if previous.is_terminal() {
        return previous;
    }
    let candidate = match (tool, phase) {
        (_, CallPhase::Failure) => None,
        (ToolKind::SearchProjects | ToolKind::GetProjectDetails, _) => {
            Some(AgentRunStatus::Selecting)
        }
        (ToolKind::FetchSponsorDocs, _) => Some(AgentRunStatus::Researching),
        (ToolKind::SubmitPlan, CallPhase::Start) => None,
        (ToolKind::SubmitPlan, CallPhase::Success) => Some(AgentRunStatus::Planning),
        (ToolKind::WriteAndTestCode, CallPhase::Start) => Some(AgentRunStatus::Coding),
        (ToolKind::WriteAndTestCode, CallPhase::Success) => Some(AgentRunStatus::Testing),
    };
    match candidate {
        Some(next) if previous.can_advance_to(next) => next,
        _ => previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentRunStatus::*;

    #[test]
    fn test_happy_path_sequence() {
        let mut s = Pending;
        s = next_status(s, ToolKind::SearchProjects, CallPhase::Start);
        assert_eq!(s, Selecting);
        s = next_status(s, ToolKind::FetchSponsorDocs, CallPhase::Start);
        assert_eq!(s, Researching);
        s = next_status(s, ToolKind::SubmitPlan, CallPhase::Start);
        assert_eq!(s, Researching);
        s = next_status(s, ToolKind::SubmitPlan, CallPhase::Success);
        assert_eq!(s, Planning);
        s = next_status(s, ToolKind::WriteAndTestCode, CallPhase::Start);
        assert_eq!(s, Coding);
        s = next_status(s, ToolKind::WriteAndTestCode, CallPhase::Success);
        assert_eq!(s, Testing);
    }

    #[test]
    fn test_selection_tools_move_between_middle_phases() {
        assert_eq!(
            next_status(Planning, ToolKind::GetProjectDetails, CallPhase::Start),
            Selecting
        );
        assert_eq!(
            next_status(Coding, ToolKind::FetchSponsorDocs, CallPhase::Start),
            Researching
        );
    }

    #[test]
    fn test_never_drops_from_testing() {
        for tool in ToolKind::ALL {
            for phase in [CallPhase::Start, CallPhase::Success, CallPhase::Failure] {
                assert_eq!(next_status(Testing, tool, phase), Testing);
            }
        }
    }

    #[test]
    fn test_terminal_is_sticky() {
        for terminal in [Completed, Failed] {
            for tool in ToolKind::ALL {
                assert_eq!(next_status(terminal, tool, CallPhase::Success), terminal);
            }
        }
    }

    #[test]
    fn test_failure_keeps_status() {
        assert_eq!(
            next_status(Researching, ToolKind::SubmitPlan, CallPhase::Failure),
            Researching
        );
        assert_eq!(
            next_status(Coding, ToolKind::WriteAndTestCode, CallPhase::Failure),
            Coding
        );
    }
}
