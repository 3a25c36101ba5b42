//! Notification port
//!
//! Delivery (templating, email, push) lives outside this service. The
//! lifecycle engine only hands events across this trait, strictly
//! fire-and-forget: a notification failure never affects reservation state.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ReservationRequested,
    ReservationConfirmed,
    ReturnDueSoon,
    ReturnOverdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ReservationRequested => "reservation_requested",
            NotificationKind::ReservationConfirmed => "reservation_confirmed",
            NotificationKind::ReturnDueSoon => "return_due_soon",
            NotificationKind::ReturnOverdue => "return_overdue",
        }
    }
}

/// Outbound notification collaborator
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Uuid,
        cc_id: Option<Uuid>,
        subject: &str,
        kind: NotificationKind,
        context: Value,
    ) -> anyhow::Result<()>;
}

/// Notifier that only logs; the default wiring until a real delivery
/// backend is attached.
pub struct LogNotifier;

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn notify(
        &self,
        recipient_id: Uuid,
        cc_id: Option<Uuid>,
        subject: &str,
        kind: NotificationKind,
        context: Value,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient_id,
            cc = ?cc_id,
            kind = kind.as_str(),
            subject,
            %context,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Dispatch a notification without blocking or failing the caller.
pub fn notify_best_effort(
    notifier: std::sync::Arc<dyn NotificationPort>,
    recipient_id: Uuid,
    cc_id: Option<Uuid>,
    subject: String,
    kind: NotificationKind,
    context: Value,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier
            .notify(recipient_id, cc_id, &subject, kind, context)
            .await
        {
            tracing::warn!(recipient = %recipient_id, kind = kind.as_str(), error = %e, "Notification delivery failed");
        }
    });
}
