//! Secret resolution, credential redaction, and bot-mention sanitization.
//!
//! Secrets are resolved file-first so container-mounted secrets win over plain
//! environment variables. Redaction removes known credential values and common
//! credential shapes from any text that reaches logs or callers.

mod redaction;
mod resolver;
mod sanitize;

pub use redaction::Redactor;
pub use resolver::{CredentialResolver, ResolvedCredential};
pub use sanitize::sanitize_bot_mentions;
