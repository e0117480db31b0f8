use anyhow::{bail, Context, Result};
use async_trait::async_trait;

/// Delivers deferred-interaction results back to the originating chat
/// surface. Behind a trait so gateway tests can record deliveries instead of
/// calling out.
#[async_trait]
pub trait FollowupNotifier: Send + Sync {
    async fn notify(
        &self,
        application_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<()>;
}

/// Posts the completion text to the interaction's follow-up webhook.
pub struct WebhookFollowupNotifier {
    client: reqwest::Client,
    api_base: String,
}

impl WebhookFollowupNotifier {
    pub fn new() -> Self {
        Self::with_api_base("https://discord.com/api/v10")
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }
}

impl Default for WebhookFollowupNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FollowupNotifier for WebhookFollowupNotifier {
    async fn notify(
        &self,
        application_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}",
            self.api_base
        );
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({"content": content}))
            .send()
            .await
            .context("failed to deliver follow-up message")?;
        if !response.status().is_success() {
            bail!("follow-up delivery returned status {}", response.status());
        }
        Ok(())
    }
}
