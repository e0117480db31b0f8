use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// A resolved secret together with the source it was read from.
///
/// The source string feeds diagnostics only; it never carries the value.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub value: String,
    pub source: String,
}

/// Resolves named secrets from file-mounted locations with an environment
/// variable fallback. File sources always win when both exist.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    secrets_dir: PathBuf,
}

fn non_empty_trimmed(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CredentialResolver {
    pub fn new(secrets_dir: impl Into<PathBuf>) -> Self {
        Self {
            secrets_dir: secrets_dir.into(),
        }
    }

    /// Resolution order: `<NAME>_FILE` env override, `<secrets_dir>/<name>`
    /// file, then the plain `<name>` environment variable. Absence is not an
    /// error; callers decide whether the credential is required.
    pub fn resolve(&self, name: &str) -> Option<ResolvedCredential> {
        let file_override = std::env::var(format!("{name}_FILE")).ok();
        if let Some(path) = non_empty_trimmed(file_override) {
            if let Some(value) = read_secret_file(Path::new(&path)) {
                return Some(ResolvedCredential {
                    value,
                    source: format!("file_override:{path}"),
                });
            }
        }

        let mounted = self.secrets_dir.join(name);
        if let Some(value) = read_secret_file(&mounted) {
            return Some(ResolvedCredential {
                value,
                source: format!("secrets_dir:{}", mounted.display()),
            });
        }

        non_empty_trimmed(std::env::var(name).ok()).map(|value| ResolvedCredential {
            value,
            source: "env".to_string(),
        })
    }

    /// Like [`resolve`](Self::resolve) but treats absence as a configuration
    /// error with a non-sensitive message.
    pub fn require(&self, name: &str) -> Result<ResolvedCredential> {
        self.resolve(name).ok_or_else(|| {
            anyhow!(
                "required credential '{name}' not found (checked {name}_FILE, {}, and env)",
                self.secrets_dir.join(name).display()
            )
        })
    }
}

fn read_secret_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "secret file unreadable");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_wins_over_environment() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        std::fs::write(tempdir.path().join("PAIRED_SECRET"), "from-file\n").expect("write");
        std::env::set_var("PAIRED_SECRET", "from-env");

        let resolver = CredentialResolver::new(tempdir.path());
        let resolved = resolver.resolve("PAIRED_SECRET").expect("resolved");
        assert_eq!(resolved.value, "from-file");
        assert!(resolved.source.starts_with("secrets_dir:"));

        std::env::remove_var("PAIRED_SECRET");
    }

    #[test]
    fn env_fallback_applies_when_file_absent() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        std::env::set_var("ENV_ONLY_SECRET", "  padded-value  ");

        let resolver = CredentialResolver::new(tempdir.path());
        let resolved = resolver.resolve("ENV_ONLY_SECRET").expect("resolved");
        assert_eq!(resolved.value, "padded-value");
        assert_eq!(resolved.source, "env");

        std::env::remove_var("ENV_ONLY_SECRET");
    }

    #[test]
    fn missing_credential_is_none_and_require_errors() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let resolver = CredentialResolver::new(tempdir.path());
        assert!(resolver.resolve("NO_SUCH_SECRET").is_none());
        let error = resolver.require("NO_SUCH_SECRET").expect_err("must fail");
        assert!(error.to_string().contains("NO_SUCH_SECRET"));
    }

    #[test]
    fn file_override_env_var_takes_priority() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let override_path = tempdir.path().join("override-secret");
        std::fs::write(&override_path, "override-value").expect("write");
        std::fs::write(tempdir.path().join("OVERRIDDEN"), "mounted-value").expect("write");
        std::env::set_var("OVERRIDDEN_FILE", override_path.display().to_string());

        let resolver = CredentialResolver::new(tempdir.path());
        let resolved = resolver.resolve("OVERRIDDEN").expect("resolved");
        assert_eq!(resolved.value, "override-value");
        assert!(resolved.source.starts_with("file_override:"));

        std::env::remove_var("OVERRIDDEN_FILE");
    }
}
