//! Operation types, tool-permission scopes, and prompt construction.
//!
//! The operation type is the sole selector for both the prompt template and
//! the execution permission scope. Caller-supplied context (repository, issue
//! number, branch) shapes the wording of the prompt but never widens the tool
//! set.

mod operation_type;
mod prompt_builder;
mod tool_scope;

pub use operation_type::OperationType;
pub use prompt_builder::{build_prompt, selected_template, PromptContext, PromptTemplate};
pub use tool_scope::{allowed_tools_line, tool_scope, ToolScope};
