use crate::domain::ports::{NotificationKind, NotificationSender};
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Notification sink that writes structured log events instead of sending
/// anything. Delivery through a real channel (email, push) sits behind the
/// same port at deployment time.
pub struct TracingNotifier;

#[async_trait]
impl NotificationSender for TracingNotifier {
    async fn notify(
        &self,
        recipient: Uuid,
        kind: NotificationKind,
        variables: serde_json::Value,
    ) -> Result<()> {
        info!(%recipient, ?kind, %variables, "notification dispatched");
        Ok(())
    }
}
