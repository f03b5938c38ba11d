mod console;
mod webhook;

use async_trait::async_trait;
use surveil_model::Alert;

pub use console::ConsoleChannel;
pub use webhook::WebhookChannel;

/// Notification sink. Implementations must isolate their own failures;
/// the dispatcher treats an Err as that channel failing alone.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn dispatch(&self, alert: &Alert) -> eyre::Result<()>;
    async fn dispatch_escalation(&self, alert: &Alert) -> eyre::Result<()>;
    async fn dispatch_resolution(&self, alert: &Alert) -> eyre::Result<()>;
}
