use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ShopError, ShopResult};
use crate::state::AppState;
use crate::types::{ChatMessage, PublicProfile, User};

const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub partner: PublicProfile,
    pub last_message: ChatMessage,
    /// Messages from the partner not yet read.
    pub unread: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub partner: PublicProfile,
    pub messages: Vec<ChatMessage>,
}

async fn partner(state: &AppState, id: Uuid) -> ShopResult<User> {
    state
        .store
        .user(id)
        .await?
        .ok_or(ShopError::NotFound("user"))
}

/// One entry per partner, most recent conversation first.
pub async fn conversations(state: &AppState, user: &User) -> ShopResult<Vec<Conversation>> {
    let messages = state.store.messages_for_user(user.id).await?;
    let mut conversations: Vec<Conversation> = Vec::new();
    for message in messages {
        let partner_id = if message.sender_id == user.id {
            message.receiver_id
        } else {
            message.sender_id
        };
        let unread = i64::from(message.receiver_id == user.id && !message.is_read);
        if let Some(existing) = conversations.iter_mut().find(|c| c.partner.id == partner_id) {
            existing.unread += unread;
            continue;
        }
        // Partners whose account is gone are left out.
        let Some(partner) = state.store.user(partner_id).await? else {
            continue;
        };
        conversations.push(Conversation {
            partner: PublicProfile::from(&partner),
            last_message: message,
            unread,
        });
    }
    Ok(conversations)
}

pub async fn thread(state: &AppState, user: &User, partner_id: Uuid) -> ShopResult<Thread> {
    let partner = partner(state, partner_id).await?;
    let marked = state.store.mark_read(partner.id, user.id).await?;
    if marked > 0 {
        debug!(user_id = %user.id, partner_id = %partner.id, marked, "messages read");
    }
    Ok(Thread {
        messages: state.store.conversation(user.id, partner.id).await?,
        partner: PublicProfile::from(&partner),
    })
}

pub async fn send(
    state: &AppState,
    user: &User,
    receiver_id: Uuid,
    message: &str,
    now: DateTime<Utc>,
) -> ShopResult<ChatMessage> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ShopError::InvalidInput("message is empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ShopError::InvalidInput(format!(
            "message is longer than {MAX_MESSAGE_LEN} characters"
        )));
    }
    if receiver_id == user.id {
        return Err(ShopError::InvalidInput("cannot message yourself".to_string()));
    }
    let receiver = partner(state, receiver_id).await?;
    let message = ChatMessage {
        id: Uuid::new_v4(),
        sender_id: user.id,
        receiver_id: receiver.id,
        message: message.to_string(),
        is_read: false,
        created_at: now,
    };
    state.store.send_message(message.clone()).await?;
    Ok(message)
}
