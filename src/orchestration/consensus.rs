//! Multi-agent consensus.
//!
//! When a task runs through several agents, their summaries are fused:
//! majority status (ties prefer done, then blocked, then skipped), sorted
//! unions of files and blockers, and attributed summary text.

use crate::agent::{AgentSummary, ResultStatus};
use std::collections::{BTreeSet, HashMap};

/// Tie-break preference, most preferred first.
const TIE_ORDER: [ResultStatus; 3] = [
    ResultStatus::Done,
    ResultStatus::Blocked,
    ResultStatus::Skipped,
];

/// Majority vote over statuses. No votes means `Skipped`.
pub fn majority_status<I>(votes: I) -> ResultStatus
where
    I: IntoIterator<Item = ResultStatus>,
{
    let mut counts: HashMap<ResultStatus, usize> = HashMap::new();
    for status in votes {
        *counts.entry(status).or_insert(0) += 1;
    }
    let Some(&max) = counts.values().max() else {
        return ResultStatus::Skipped;
    };
    TIE_ORDER
        .into_iter()
        .find(|status| counts.get(status) == Some(&max))
        .unwrap_or(ResultStatus::Skipped)
}

/// Fuse the summaries of every agent that succeeded on one task.
///
/// A single summary is returned unchanged.
pub fn reduce(summaries: &[AgentSummary]) -> AgentSummary {
    if let [only] = summaries {
        return only.clone();
    }

    let status = majority_status(summaries.iter().map(|s| s.status));

    let files: BTreeSet<&String> = summaries.iter().flat_map(|s| &s.files).collect();
    let blockers: BTreeSet<&String> = summaries.iter().flat_map(|s| &s.blockers).collect();

    let texts: Vec<(usize, &str)> = summaries
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.summary.is_empty())
        .map(|(i, s)| (i, s.summary.as_str()))
        .collect();
    let summary = match texts.as_slice() {
        [] => String::new(),
        [(_, text)] => text.to_string(),
        many => {
            let parts: Vec<String> = many
                .iter()
                .map(|(i, text)| format!("[Agent {}] {}", i, text))
                .collect();
            format!(
                "Multi-agent consensus ({} agents):\n{}",
                summaries.len(),
                parts.join("\n")
            )
        }
    };

    AgentSummary {
        task_id: summaries
            .iter()
            .find_map(|s| s.task_id.clone().filter(|id| !id.is_empty())),
        status,
        summary,
        files: files.into_iter().cloned().collect(),
        blockers: blockers.into_iter().cloned().collect(),
    }
}
