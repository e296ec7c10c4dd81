use super::types::{
    Chat, ChatMember, GetChat, GetChatMember, GetUpdates, TelegramConfig, TelegramMessage,
    TelegramResponse, Update, User,
};
use crate::errors::TransportError;
use crate::models::destination::{ChannelRef, Destination, DestinationId};
use crate::transport::{ChatTransport, Identity, IncomingMessage, TransportEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// `ChatTransport` over the Telegram Bot API, using long polling.
///
/// The Bot API can't list the chats a bot is in, so destinations are learned
/// from incoming updates and seeded from persisted settings at startup.
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
    offset: Mutex<i64>,
    known: Mutex<BTreeMap<DestinationId, Destination>>,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig, seed: impl IntoIterator<Item = DestinationId>) -> Self {
        let known = seed
            .into_iter()
            .map(|id| (id.clone(), Destination::chat(id, None)))
            .collect();
        Self {
            client: Client::new(),
            config,
            offset: Mutex::new(0),
            known: Mutex::new(known),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.config.method_url(method))
            .timeout(self.config.request_timeout(method))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let telegram_response: TelegramResponse<T> = serde_json::from_str(&text)
            .map_err(|e| TransportError::Decode(format!("{method} ({status}): {e}")))?;

        if !telegram_response.ok {
            let error_msg = telegram_response
                .description
                .unwrap_or_else(|| format!("Unknown Telegram API error ({status})"));
            return Err(TransportError::Api(error_msg));
        }

        telegram_response
            .result
            .ok_or_else(|| TransportError::Decode(format!("No result in {method} response")))
    }

    fn lock_known(&self) -> std::sync::MutexGuard<'_, BTreeMap<DestinationId, Destination>> {
        self.known.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn connect(&self) -> Result<Identity, TransportError> {
        if self.config.bot_token.is_empty() {
            return Err(TransportError::MissingToken);
        }
        let me: User = self.call("getMe", &serde_json::json!({})).await?;
        Ok(Identity {
            id: me.id.to_string(),
            username: me.display_name(),
        })
    }

    async fn poll_events(&self) -> Result<Vec<TransportEvent>, TransportError> {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        let request = GetUpdates {
            offset,
            timeout: self.config.poll_timeout_secs,
            allowed_updates: vec!["message", "my_chat_member"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request).await?;

        let mut known = self.lock_known();
        let (events, next_offset) = events_from_updates(updates, &mut known);
        if let Some(next) = next_offset {
            *self.offset.lock().unwrap_or_else(|e| e.into_inner()) = next;
        }
        Ok(events)
    }

    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), TransportError> {
        let message = TelegramMessage {
            chat_id: channel.0.clone(),
            text: text.to_string(),
            parse_mode: None,
            disable_web_page_preview: None,
        };
        let _: serde_json::Value = self.call("sendMessage", &message).await?;
        Ok(())
    }

    async fn destinations(&self) -> Vec<Destination> {
        self.lock_known().values().cloned().collect()
    }

    async fn is_admin(&self, destination: &Destination, user_id: &str) -> Result<bool, TransportError> {
        if is_private_chat(&destination.id) {
            return Ok(true);
        }
        let user_id = user_id
            .parse::<i64>()
            .map_err(|_| TransportError::Decode(format!("Invalid user id {user_id}")))?;
        let member: ChatMember = self
            .call(
                "getChatMember",
                &GetChatMember {
                    chat_id: destination.id.0.clone(),
                    user_id,
                },
            )
            .await?;
        Ok(member.is_admin())
    }

    async fn resolve_channel(&self, name: &str) -> Result<Option<ChannelRef>, TransportError> {
        let request = GetChat {
            chat_id: name.to_string(),
        };
        match self.call::<_, Chat>("getChat", &request).await {
            Ok(chat) => Ok(Some(ChannelRef(chat.id.to_string()))),
            Err(TransportError::Api(e)) => {
                log::debug!("getChat {name} failed: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn disconnect(&self) {
        // long polling holds no server-side session
        log::info!("Telegram transport disconnected");
    }
}

/// Private chats have positive ids, groups and channels negative ones.
fn is_private_chat(id: &DestinationId) -> bool {
    id.0.parse::<i64>().map(|id| id > 0).unwrap_or(false)
}

fn destination_for(chat: &Chat) -> Destination {
    Destination::chat(DestinationId::from(chat.id), chat.display_name())
}

/// Turn a getUpdates batch into transport events, updating the known
/// destinations. Returns the offset for the next poll.
pub(crate) fn events_from_updates(
    updates: Vec<Update>,
    known: &mut BTreeMap<DestinationId, Destination>,
) -> (Vec<TransportEvent>, Option<i64>) {
    let mut events = Vec::new();
    let mut next_offset = None;

    for update in updates {
        next_offset = Some(next_offset.unwrap_or(i64::MIN).max(update.update_id + 1));

        if let Some(member_update) = update.my_chat_member {
            let destination = destination_for(&member_update.chat);
            if member_update.new_chat_member.is_present() {
                known.insert(destination.id.clone(), destination.clone());
                events.push(TransportEvent::Joined(destination));
            } else {
                known.remove(&destination.id);
                events.push(TransportEvent::Left(destination.id));
            }
        }

        if let Some(message) = update.message {
            let destination = destination_for(&message.chat);
            let is_new = known
                .insert(destination.id.clone(), destination.clone())
                .is_none();

            match (message.text, message.from) {
                (Some(text), Some(from)) if !from.is_bot => {
                    events.push(TransportEvent::Message(IncomingMessage {
                        channel: destination.default_channel.clone(),
                        destination,
                        author_id: from.id.to_string(),
                        author_name: from.display_name(),
                        text,
                    }));
                }
                _ if is_new => events.push(TransportEvent::Joined(destination)),
                _ => {}
            }
        }
    }

    (events, next_offset)
}
