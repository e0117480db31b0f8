use crate::OperationType;

/// Statically defined allow-list of tools for one operation type.
///
/// The rendered list is both documentation and contract: the prompt text
/// enumerates exactly these names, and the orchestrator exports exactly these
/// names in the allowed-tools environment variable. Anything not listed is
/// denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolScope {
    pub tools: &'static [&'static str],
}

const FULL_ACCESS_TOOLS: &[&str] = &[
    "bash",
    "read_file",
    "write_file",
    "edit_file",
    "glob",
    "grep",
    "web_fetch",
    "github_comment",
    "github_labels",
    "github_pull_request",
];

const AUTO_TAGGING_TOOLS: &[&str] = &["read_file", "glob", "grep", "github_labels"];

const PR_REVIEW_TOOLS: &[&str] = &[
    "read_file",
    "glob",
    "grep",
    "web_fetch",
    "github_comment",
    "github_pull_request",
];

const FULL_SCOPE: ToolScope = ToolScope {
    tools: FULL_ACCESS_TOOLS,
};
const AUTO_TAGGING_SCOPE: ToolScope = ToolScope {
    tools: AUTO_TAGGING_TOOLS,
};
const PR_REVIEW_SCOPE: ToolScope = ToolScope {
    tools: PR_REVIEW_TOOLS,
};

/// Maps an operation type to its permission scope. This is the only place
/// privilege is decided.
pub fn tool_scope(operation_type: OperationType) -> &'static ToolScope {
    match operation_type {
        OperationType::Default
        | OperationType::GithubContext
        | OperationType::DiscordRepository => &FULL_SCOPE,
        OperationType::AutoTagging => &AUTO_TAGGING_SCOPE,
        OperationType::PrReview | OperationType::ManualPrReview => &PR_REVIEW_SCOPE,
    }
}

/// Comma-joined tool list in declaration order, used verbatim in both the
/// prompt body and the allowed-tools environment variable.
pub fn allowed_tools_line(operation_type: OperationType) -> String {
    tool_scope(operation_type).tools.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_tagging_scope_has_no_write_or_comment_tools() {
        let scope = tool_scope(OperationType::AutoTagging);
        for denied in ["bash", "write_file", "edit_file", "github_comment"] {
            assert!(!scope.tools.contains(&denied), "{denied} must be denied");
        }
        assert!(scope.tools.contains(&"github_labels"));
    }

    #[test]
    fn pr_review_scope_cannot_mutate_the_worktree() {
        let scope = tool_scope(OperationType::PrReview);
        for denied in ["bash", "write_file", "edit_file"] {
            assert!(!scope.tools.contains(&denied), "{denied} must be denied");
        }
        assert!(scope.tools.contains(&"github_comment"));
        assert_eq!(scope, tool_scope(OperationType::ManualPrReview));
    }

    #[test]
    fn full_access_variants_share_one_scope() {
        assert_eq!(
            tool_scope(OperationType::Default),
            tool_scope(OperationType::GithubContext)
        );
        assert_eq!(
            tool_scope(OperationType::Default),
            tool_scope(OperationType::DiscordRepository)
        );
    }

    #[test]
    fn allowed_tools_line_is_stable() {
        assert_eq!(
            allowed_tools_line(OperationType::AutoTagging),
            "read_file, glob, grep, github_labels"
        );
    }
}
