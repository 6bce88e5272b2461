use shared::{
    domain::{DeskNotifyScope, UserId},
    protocol::{ConversationEnvelope, ConversationMessage},
};

/// A conversation chosen to surface a "new message" notice, together with
/// the messages that remain once the user's own sends are dropped.
#[derive(Debug)]
pub struct Selection<'a> {
    pub envelope: &'a ConversationEnvelope,
    pub messages: Vec<&'a ConversationMessage>,
}

/// Picks the conversation a desk notification should name, scanning the
/// batch's envelopes in arrival order. First match wins: any `all`-scoped
/// envelope with remaining messages beats every `mines` envelope, and a
/// `mines` envelope only qualifies when it is assigned to the current user.
/// Self-sent messages never count.
pub fn select_new_message<'a>(
    envelopes: &[&'a ConversationEnvelope],
    current_user: UserId,
) -> Option<Selection<'a>> {
    let with_remaining = |envelope: &'a ConversationEnvelope| {
        let messages: Vec<&ConversationMessage> = envelope
            .messages
            .iter()
            .filter(|message| !message.from_me)
            .collect();
        (!messages.is_empty()).then_some(Selection { envelope, messages })
    };

    envelopes
        .iter()
        .copied()
        .filter(|envelope| envelope.desk_notify == DeskNotifyScope::All)
        .find_map(with_remaining)
        .or_else(|| {
            envelopes
                .iter()
                .copied()
                .filter(|envelope| {
                    envelope.desk_notify == DeskNotifyScope::Mines
                        && envelope.agent_id == Some(current_user)
                })
                .find_map(with_remaining)
        })
}
