use regex::Regex;

/// Neutralizes the bot's own trigger mention so echoed output can never
/// re-trigger the webhook loop. A zero-width space is inserted after the `@`
/// so the text stays readable while no longer matching the trigger phrase.
///
/// Applied unconditionally to every string that can reach a triggering
/// surface: normal responses, test-mode stubs, and error messages.
pub fn sanitize_bot_mentions(text: &str, trigger_name: &str) -> String {
    let trigger_name = trigger_name.trim();
    if trigger_name.is_empty() {
        return text.to_string();
    }
    let pattern = format!(r"(?i)@({})\b", regex::escape(trigger_name));
    match Regex::new(&pattern) {
        Ok(mention) => mention
            .replace_all(text, "@\u{200B}${1}")
            .into_owned(),
        Err(_) => text.replace('@', "@\u{200B}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_mentions_are_broken() {
        let clean = sanitize_bot_mentions("ping @ForgeBot please", "ForgeBot");
        assert!(!clean.contains("@ForgeBot"));
        assert!(clean.contains("ForgeBot"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let clean = sanitize_bot_mentions("hey @forgebot and @FORGEBOT", "ForgeBot");
        assert!(!clean.to_lowercase().contains("@forgebot"));
    }

    #[test]
    fn other_mentions_are_untouched() {
        let clean = sanitize_bot_mentions("cc @reviewer", "ForgeBot");
        assert_eq!(clean, "cc @reviewer");
    }

    #[test]
    fn empty_trigger_is_identity() {
        assert_eq!(sanitize_bot_mentions("@anything", "  "), "@anything");
    }

    #[test]
    fn sanitization_is_idempotent() {
        let once = sanitize_bot_mentions("@ForgeBot", "ForgeBot");
        let twice = sanitize_bot_mentions(&once, "ForgeBot");
        assert_eq!(once, twice);
    }
}
