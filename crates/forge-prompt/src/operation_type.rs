use serde::{Deserialize, Serialize};

/// Closed set of execution policies. Each variant maps to exactly one prompt
/// template family and one statically defined tool scope; new variants must
/// declare their scope explicitly rather than inheriting a broader one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// General-purpose execution with full tool access.
    Default,
    /// Repository-scoped GitHub work with full tool access and an
    /// acknowledgment-first protocol for long tasks.
    GithubContext,
    /// Issue classification: read plus label tools only, minimal privilege.
    AutoTagging,
    /// Automated pull-request review: broad read, constrained write.
    PrReview,
    /// Operator-requested pull-request review; same scope as `PrReview`.
    ManualPrReview,
    /// Repository-scoped work dispatched from a Discord command.
    DiscordRepository,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::GithubContext => "github-context",
            Self::AutoTagging => "auto-tagging",
            Self::PrReview => "pr-review",
            Self::ManualPrReview => "manual-pr-review",
            Self::DiscordRepository => "discord-repository",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "github-context" => Ok(Self::GithubContext),
            "auto-tagging" => Ok(Self::AutoTagging),
            "pr-review" => Ok(Self::PrReview),
            "manual-pr-review" => Ok(Self::ManualPrReview),
            "discord-repository" => Ok(Self::DiscordRepository),
            other => Err(format!("unknown operation type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_serde_and_fromstr() {
        for op in [
            OperationType::Default,
            OperationType::GithubContext,
            OperationType::AutoTagging,
            OperationType::PrReview,
            OperationType::ManualPrReview,
            OperationType::DiscordRepository,
        ] {
            let encoded = serde_json::to_string(&op).expect("encode");
            assert_eq!(encoded, format!("\"{}\"", op.as_str()));
            let decoded: OperationType = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, op);
            assert_eq!(op.as_str().parse::<OperationType>().expect("parse"), op);
        }
    }

    #[test]
    fn unknown_operation_type_is_rejected() {
        assert!("admin-everything".parse::<OperationType>().is_err());
    }
}
