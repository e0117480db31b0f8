use crate::{allowed_tools_line, OperationType};

/// Repository context accompanying a command. `issue_number == Some(0)` with
/// `is_pull_request == false` is the chat-surface sentinel meaning "scoped to
/// the repository, no specific issue"; it is matched explicitly here and
/// nowhere else.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub repo_full_name: Option<String>,
    pub issue_number: Option<u64>,
    pub is_pull_request: bool,
    pub branch_name: Option<String>,
}

/// The template families a request can resolve to. Selection is a pure
/// function of `(operation_type, context)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    AutoTagging,
    ChatRepository,
    FullContext,
    General,
}

/// First-match-wins template selection.
pub fn selected_template(
    operation_type: OperationType,
    context: &PromptContext,
) -> PromptTemplate {
    if operation_type == OperationType::AutoTagging {
        return PromptTemplate::AutoTagging;
    }
    if context.repo_full_name.is_some() {
        if context.issue_number == Some(0) && !context.is_pull_request {
            return PromptTemplate::ChatRepository;
        }
        if context.issue_number.is_some() {
            return PromptTemplate::FullContext;
        }
    }
    PromptTemplate::General
}

/// Builds the complete instruction text for one execution. The tool list
/// rendered here is the permission contract; the orchestrator exports the
/// identical list to the execution environment.
pub fn build_prompt(
    operation_type: OperationType,
    context: &PromptContext,
    command: &str,
) -> String {
    let tools = allowed_tools_line(operation_type);
    match selected_template(operation_type, context) {
        PromptTemplate::AutoTagging => build_auto_tagging_prompt(context, command, &tools),
        PromptTemplate::ChatRepository => build_chat_repository_prompt(context, command, &tools),
        PromptTemplate::FullContext => build_full_context_prompt(context, command, &tools),
        PromptTemplate::General => build_general_prompt(command, &tools),
    }
}

fn repo_or_unknown(context: &PromptContext) -> &str {
    context
        .repo_full_name
        .as_deref()
        .unwrap_or("(unknown repository)")
}

fn build_auto_tagging_prompt(context: &PromptContext, command: &str, tools: &str) -> String {
    let issue = context
        .issue_number
        .map(|number| number.to_string())
        .unwrap_or_else(|| "(unspecified)".to_string());
    format!(
        "You are an issue triage assistant for the repository {repo}.\n\
         Your only task is to analyze issue #{issue} and apply the most\n\
         appropriate labels. Read the issue and related code as needed, then\n\
         apply labels that describe its type, affected area, and priority.\n\
         \n\
         Do NOT post comments, edit files, or take any action other than\n\
         reading and applying labels. You have no tools for anything else.\n\
         \n\
         Available tools: {tools}\n\
         \n\
         Task:\n{command}\n",
        repo = repo_or_unknown(context),
        issue = issue,
        tools = tools,
        command = command,
    )
}

fn build_chat_repository_prompt(context: &PromptContext, command: &str, tools: &str) -> String {
    format!(
        "You are a development assistant working in the repository {repo}.\n\
         The request comes from a chat command scoped to the repository as a\n\
         whole; there is no specific issue or pull request in context. Work\n\
         on the default branch unless the request names another one.\n\
         \n\
         Available tools: {tools}\n\
         \n\
         Request:\n{command}\n",
        repo = repo_or_unknown(context),
        tools = tools,
        command = command,
    )
}

fn build_full_context_prompt(context: &PromptContext, command: &str, tools: &str) -> String {
    let issue = context.issue_number.unwrap_or_default();
    let subject = if context.is_pull_request {
        format!("pull request #{issue}")
    } else {
        format!("issue #{issue}")
    };
    let branch_line = match context.branch_name.as_deref() {
        Some(branch) => format!("The relevant branch is '{branch}'.\n"),
        None => String::new(),
    };
    format!(
        "You are a development assistant working in the repository {repo},\n\
         responding on {subject}.\n\
         {branch_line}\
         If the task will take more than a moment, first post a brief\n\
         acknowledgment comment so the requester knows work has started,\n\
         then carry out the task and report the outcome.\n\
         \n\
         Available tools: {tools}\n\
         \n\
         Request:\n{command}\n",
        repo = repo_or_unknown(context),
        subject = subject,
        branch_line = branch_line,
        tools = tools,
        command = command,
    )
}

fn build_general_prompt(command: &str, tools: &str) -> String {
    format!(
        "You are a general-purpose development assistant. No repository is\n\
         in context; operate on the workspace you are given.\n\
         \n\
         Available tools: {tools}\n\
         \n\
         Request:\n{command}\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_context(issue_number: Option<u64>, is_pull_request: bool) -> PromptContext {
        PromptContext {
            repo_full_name: Some("acme/widget".to_string()),
            issue_number,
            is_pull_request,
            branch_name: None,
        }
    }

    #[test]
    fn auto_tagging_wins_over_every_context_shape() {
        let context = repo_context(Some(0), false);
        assert_eq!(
            selected_template(OperationType::AutoTagging, &context),
            PromptTemplate::AutoTagging
        );
    }

    #[test]
    fn sentinel_zero_issue_selects_chat_repository_template() {
        let context = repo_context(Some(0), false);
        assert_eq!(
            selected_template(OperationType::Default, &context),
            PromptTemplate::ChatRepository
        );
    }

    #[test]
    fn real_issue_number_selects_full_context_template() {
        let context = repo_context(Some(5), true);
        assert_eq!(
            selected_template(OperationType::Default, &context),
            PromptTemplate::FullContext
        );
        let prompt = build_prompt(OperationType::Default, &context, "review this");
        assert!(prompt.contains("pull request #5"));

        let issue_context = repo_context(Some(5), false);
        let prompt = build_prompt(OperationType::Default, &issue_context, "fix this");
        assert!(prompt.contains("issue #5"));
    }

    #[test]
    fn missing_repository_selects_general_template() {
        let context = PromptContext::default();
        assert_eq!(
            selected_template(OperationType::Default, &context),
            PromptTemplate::General
        );
    }

    #[test]
    fn branch_name_appears_in_full_context_prompt() {
        let mut context = repo_context(Some(12), false);
        context.branch_name = Some("feature/retry".to_string());
        let prompt = build_prompt(OperationType::GithubContext, &context, "do it");
        assert!(prompt.contains("'feature/retry'"));
    }

    #[test]
    fn prompt_tool_enumeration_matches_scope_line() {
        let context = repo_context(Some(42), false);
        let prompt = build_prompt(OperationType::AutoTagging, &context, "classify this issue");
        let line = allowed_tools_line(OperationType::AutoTagging);
        assert!(prompt.contains(&format!("Available tools: {line}")));
        assert!(!prompt.to_lowercase().contains("write_file"));
        assert!(!prompt.contains("github_comment"));
    }

    #[test]
    fn prompt_embeds_raw_command_text_verbatim() {
        let command = "run `cargo fmt` and open a PR";
        let prompt = build_prompt(OperationType::Default, &PromptContext::default(), command);
        assert!(prompt.contains(command));
    }
}
