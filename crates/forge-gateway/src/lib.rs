//! HTTP surface for the execution gateway: session browsing, direct
//! execution dispatch, and signature-verified webhook intake for GitHub
//! events and Discord interactions.
//!
//! All state is injected through [`GatewayState`]; the router owns no
//! process-wide singletons, so tests run against a real listener with a
//! stub notifier and a temporary session store.

mod api_error;
mod endpoints;
mod execute_api;
mod followup;
mod server;
mod session_api;
mod signature;
mod webhook_discord;
mod webhook_github;

pub use followup::{FollowupNotifier, WebhookFollowupNotifier};
pub use server::{build_gateway_router, run_gateway_server, GatewayState};
pub use signature::parse_discord_public_key;
