//! Continuation heuristic: decides whether to force another loop
//! iteration when the model proposes a final answer. Model tool-use is
//! not guaranteed to chain multi-step plans without prompting; this is
//! a cheap keyword/recency check, not a workflow engine.

use std::collections::HashSet;

/// Words in the user's request that imply multi-step work.
const ACTION_KEYWORDS: [&str; 7] = [
    "create", "build", "make", "generate", "install", "run", "setup",
];

/// Injected as a system message when the verdict is to keep going.
pub const NUDGE_MESSAGE: &str = "The user's request may require multiple steps. Consider what \
     files need to be created or commands need to be run to fully complete their request.";

/// Returns true when the run should loop again despite the model not
/// requesting tools. `window` bounds how many of the most recent tool
/// results count as evidence of progress.
pub fn decide_continue(
    user_text: &str,
    recent_tool_names: &[String],
    total_results: usize,
    window: usize,
) -> bool {
    let text = user_text.to_lowercase();
    if !ACTION_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return false;
    }

    // Multi-step work requested but nothing done yet.
    if total_results == 0 {
        return true;
    }

    // Progress means the recent history shows more than one kind of
    // tool activity; environment setup alone does not count.
    let recent: HashSet<&str> = recent_tool_names
        .iter()
        .rev()
        .take(window)
        .map(|s| s.as_str())
        .collect();
    recent.len() < 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_action_keyword_never_continues() {
        assert!(!decide_continue("what time is it?", &[], 0, 3));
        assert!(!decide_continue(
            "explain this error",
            &names(&["run_command"]),
            1,
            3
        ));
    }

    #[test]
    fn keyword_with_no_results_continues() {
        assert!(decide_continue("create a todo app", &[], 0, 3));
        assert!(decide_continue("please BUILD me a site", &[], 0, 3));
    }

    #[test]
    fn setup_alone_is_not_progress() {
        let history = names(&["create_environment", "create_environment"]);
        assert!(decide_continue("create a todo app", &history, 2, 3));
    }

    #[test]
    fn varied_recent_activity_completes() {
        let history = names(&["create_environment", "write_file", "run_command"]);
        assert!(!decide_continue("create a todo app", &history, 3, 3));
    }

    #[test]
    fn window_limits_what_counts_as_recent() {
        // Variety exists but only outside the recency window.
        let history = names(&["write_file", "run_command", "run_command", "run_command"]);
        assert!(decide_continue("install the deps", &history, 4, 3));
        // A wider window sees the variety.
        assert!(!decide_continue("install the deps", &history, 4, 4));
    }
}
