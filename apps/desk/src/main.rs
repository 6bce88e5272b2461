use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use desk_core::{
    load_settings, DeskNotifier, LocalTabHub, NotificationSink, ReloadTarget, Surface, ViewState,
};
use shared::{
    domain::{ConversationId, DeskNotifyScope, MessageKind, UserId},
    protocol::{
        ConversationEnvelope, ConversationMessage, InboundEvent, Notice, OptInUpdate,
    },
};
use tracing::info;

/// Replays a sample push through two simulated tabs: the chatroom tab claims
/// the batch and the plain tab's debounce timer is cancelled.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 7)]
    user_id: i64,
}

struct LogSink {
    tab: &'static str,
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn show_notification(&self, notice: Notice) -> Result<()> {
        info!(
            tab = self.tab,
            title = %notice.title,
            message = %notice.message,
            kind = ?notice.kind,
            "toast"
        );
        Ok(())
    }

    async fn reload_view(&self, target: ReloadTarget) -> Result<()> {
        info!(tab = self.tab, ?target, "view reload");
        Ok(())
    }
}

fn sample_batch() -> Vec<InboundEvent> {
    vec![
        InboundEvent::NewMessages(vec![ConversationEnvelope {
            conversation_id: ConversationId(1),
            name: "Bob".to_string(),
            number_format: "+1 555 0100".to_string(),
            desk_notify: DeskNotifyScope::All,
            agent_id: None,
            messages: vec![ConversationMessage {
                from_me: false,
                text: Some("hi".to_string()),
                kind: MessageKind::Text,
                user_id: UserId(12),
                error_message: None,
            }],
        }]),
        InboundEvent::OptIn(OptInUpdate {
            conversation_id: ConversationId(42),
            contact_name: "Alice".to_string(),
            opted_in: true,
        }),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = load_settings();

    let hub = LocalTabHub::new();

    let chatroom = DeskNotifier::new(
        UserId(args.user_id),
        &settings,
        Arc::new(LogSink { tab: "chatroom" }),
        hub.endpoint().await,
    );
    chatroom
        .set_view_state(ViewState {
            surface: Surface::Chatroom,
            dialog: None,
        })
        .await;
    chatroom.start().await;

    let plain = DeskNotifier::new(
        UserId(args.user_id),
        &settings,
        Arc::new(LogSink { tab: "plain" }),
        hub.endpoint().await,
    );
    plain
        .set_view_state(ViewState {
            surface: Surface::Other,
            dialog: None,
        })
        .await;
    plain.start().await;

    plain.on_batch_arrived(sample_batch()).await?;
    chatroom.on_batch_arrived(sample_batch()).await?;

    tokio::time::sleep(settings.debounce() * 4).await;
    info!("done; only the chatroom tab should have shown toasts");
    Ok(())
}
