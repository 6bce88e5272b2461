use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{ConversationId, MessageKind, UserId},
    protocol::{ConversationEnvelope, InboundEvent, Notice, NoticeKind, OptInUpdate},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::AbortHandle,
};
use tracing::{debug, warn};

pub mod attachment;
pub mod channel;
pub mod classify;
pub mod config;

pub use channel::{
    ChannelUpdate, LocalTabEndpoint, LocalTabHub, MissingTabChannel, TabChannel,
    CHATROOM_NOTIFICATION_KEY,
};
pub use config::{load_settings, Settings};

/// View the host asks the sink to refresh after an opt-in change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTarget {
    ConversationList,
    ConversationDialog(ConversationId),
}

/// Host-side notification display and view-reload mechanisms.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show_notification(&self, notice: Notice) -> Result<()>;
    async fn reload_view(&self, target: ReloadTarget) -> Result<()>;
}

pub struct MissingNotificationSink;

#[async_trait]
impl NotificationSink for MissingNotificationSink {
    async fn show_notification(&self, _notice: Notice) -> Result<()> {
        Err(anyhow!("notification sink is unavailable"))
    }

    async fn reload_view(&self, _target: ReloadTarget) -> Result<()> {
        Err(anyhow!("notification sink is unavailable"))
    }
}

/// Main surface currently shown in this tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Surface {
    #[default]
    None,
    /// The live conversation-list surface. The tab showing it is
    /// authoritative for notification dispatch.
    Chatroom,
    /// A plain list view over conversation records.
    ConversationList,
    Other,
}

/// Navigation state reported by the host on every active-view change. The
/// dialog is a message-composer bound to one conversation and can sit on top
/// of any surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
    pub surface: Surface,
    pub dialog: Option<ConversationId>,
}

impl ViewState {
    pub fn is_chatroom_surface(&self) -> bool {
        self.surface == Surface::Chatroom
    }
}

#[derive(Default)]
struct NotifierState {
    view: ViewState,
    pending: HashMap<String, AbortHandle>,
    listener_started: bool,
}

/// Per-tab notification pipeline: deduplicates pushes delivered to every tab
/// of the same session, debounces bursts, and routes typed events to the
/// host sink.
pub struct DeskNotifier {
    current_user: UserId,
    debounce: Duration,
    sink: Arc<dyn NotificationSink>,
    channel: Arc<dyn TabChannel>,
    inner: Mutex<NotifierState>,
}

impl DeskNotifier {
    pub fn new(
        current_user: UserId,
        settings: &Settings,
        sink: Arc<dyn NotificationSink>,
        channel: Arc<dyn TabChannel>,
    ) -> Arc<Self> {
        Arc::new(Self {
            current_user,
            debounce: settings.debounce(),
            sink,
            channel,
            inner: Mutex::new(NotifierState::default()),
        })
    }

    /// Host callback for "active view changed".
    pub async fn set_view_state(&self, view: ViewState) {
        let mut guard = self.inner.lock().await;
        guard.view = view;
    }

    /// Spawns the cross-tab listener. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut guard = self.inner.lock().await;
            if guard.listener_started {
                return;
            }
            guard.listener_started = true;
        }

        let mut updates = self.channel.updates();
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => notifier.on_channel_update(update).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "cross-tab listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Entry point for one delivered batch of pushed events.
    ///
    /// The chatroom tab claims the batch on the cross-tab channel and
    /// dispatches it directly; every other tab schedules a debounced
    /// dispatch that the claim cancels. When no chatroom tab exists, each
    /// tab fires after its own window and duplicate toasts are expected.
    pub async fn on_batch_arrived(self: &Arc<Self>, events: Vec<InboundEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let key = canonical_key(&events)?;

        let is_chatroom = { self.inner.lock().await.view.is_chatroom_surface() };
        if is_chatroom {
            let claim = serde_json::to_string(&key).context("failed to encode batch claim")?;
            self.channel
                .publish(CHATROOM_NOTIFICATION_KEY, &claim)
                .await?;
            self.process_batch(&events).await;
            return Ok(());
        }

        let mut guard = self.inner.lock().await;
        if guard.pending.contains_key(&key) {
            debug!(key = %key, "batch already pending, coalesced");
            return Ok(());
        }
        let notifier = Arc::clone(self);
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(notifier.debounce).await;
            // Remove-then-dispatch keeps the timer idempotent against a
            // racing cross-tab cancellation.
            let due = notifier
                .inner
                .lock()
                .await
                .pending
                .remove(&timer_key)
                .is_some();
            if due {
                notifier.process_batch(&events).await;
            }
        });
        guard.pending.insert(key, handle.abort_handle());
        Ok(())
    }

    async fn on_channel_update(&self, update: ChannelUpdate) {
        if update.key != CHATROOM_NOTIFICATION_KEY {
            return;
        }
        let claimed: String = match serde_json::from_str(&update.value) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "ignoring malformed cross-tab claim");
                return;
            }
        };
        let mut guard = self.inner.lock().await;
        if let Some(handle) = guard.pending.remove(&claimed) {
            handle.abort();
            debug!("pending dispatch cancelled, another tab claimed the batch");
        }
    }

    /// Dispatch router: every kind present in the batch is processed; kinds
    /// are independent.
    async fn process_batch(&self, events: &[InboundEvent]) {
        let new_message_envelopes: Vec<&ConversationEnvelope> = events
            .iter()
            .filter_map(|event| match event {
                InboundEvent::NewMessages(envelopes) => Some(envelopes.iter()),
                _ => None,
            })
            .flatten()
            .collect();
        if let Some(selection) =
            classify::select_new_message(&new_message_envelopes, self.current_user)
        {
            self.show(new_message_notice(&selection)).await;
        }

        for event in events {
            match event {
                InboundEvent::OptIn(update) => self.process_opt_in(update).await,
                InboundEvent::ErrorMessages(envelopes) => {
                    self.process_error_messages(envelopes).await;
                }
                InboundEvent::NewMessages(_) => {}
            }
        }
    }

    async fn process_opt_in(&self, update: &OptInUpdate) {
        let verb = if update.opted_in {
            "activate"
        } else {
            "deactivate"
        };
        let kind = if update.opted_in {
            NoticeKind::Success
        } else {
            NoticeKind::Warning
        };
        self.show(Notice {
            title: "Opt-in update".to_string(),
            message: format!("{} {verb} opt-in.", update.contact_name),
            kind: Some(kind),
            sticky: true,
        })
        .await;

        let view = { self.inner.lock().await.view };
        if view.surface == Surface::ConversationList {
            self.reload_best_effort(ReloadTarget::ConversationList)
                .await;
        }
        if view.dialog == Some(update.conversation_id) {
            self.reload_best_effort(ReloadTarget::ConversationDialog(update.conversation_id))
                .await;
        }
    }

    async fn process_error_messages(&self, envelopes: &[ConversationEnvelope]) {
        for envelope in envelopes {
            for message in &envelope.messages {
                if message.user_id != self.current_user {
                    continue;
                }
                let error = message.error_message.as_deref().unwrap_or_default();
                let mut body = format!("Error: {error}");
                if let Some(text) = message.text.as_deref() {
                    if !text.is_empty() {
                        body.push_str("<br> Message: ");
                        body.push_str(text);
                    }
                }
                self.show(Notice {
                    title: format!(
                        "Message with error in <br>{} ({})",
                        envelope.name, envelope.number_format
                    ),
                    message: body,
                    kind: Some(NoticeKind::Danger),
                    sticky: true,
                })
                .await;
            }
        }
    }

    async fn reload_best_effort(&self, target: ReloadTarget) {
        if let Err(err) = self.sink.reload_view(target).await {
            debug!(error = %err, ?target, "view reload failed, leaving view stale");
        }
    }

    async fn show(&self, notice: Notice) {
        if let Err(err) = self.sink.show_notification(notice).await {
            warn!(error = %err, "failed to show notification");
        }
    }
}

fn new_message_notice(selection: &classify::Selection<'_>) -> Notice {
    let message = selection
        .messages
        .first()
        .filter(|message| message.kind == MessageKind::Text)
        .and_then(|message| message.text.clone())
        .unwrap_or_default();
    Notice {
        title: format!("New Message from {}", selection.envelope.name),
        message,
        kind: None,
        sticky: false,
    }
}

/// Canonical, order-preserving serialization of a batch. Tabs receiving the
/// identical push derive the identical key.
pub fn canonical_key(events: &[InboundEvent]) -> Result<String> {
    serde_json::to_string(events).context("failed to serialize batch key")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
