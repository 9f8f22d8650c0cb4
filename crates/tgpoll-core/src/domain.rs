use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

/// Telegram update id. Strictly increasing across the stream, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(pub i64);

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Update categories, in their wire form. Also used as the `allowed_updates`
/// subscription filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCategory {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
}

impl UpdateCategory {
    pub const ALL: [UpdateCategory; 14] = [
        UpdateCategory::Message,
        UpdateCategory::EditedMessage,
        UpdateCategory::ChannelPost,
        UpdateCategory::EditedChannelPost,
        UpdateCategory::InlineQuery,
        UpdateCategory::ChosenInlineResult,
        UpdateCategory::CallbackQuery,
        UpdateCategory::ShippingQuery,
        UpdateCategory::PreCheckoutQuery,
        UpdateCategory::Poll,
        UpdateCategory::PollAnswer,
        UpdateCategory::MyChatMember,
        UpdateCategory::ChatMember,
        UpdateCategory::ChatJoinRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateCategory::Message => "message",
            UpdateCategory::EditedMessage => "edited_message",
            UpdateCategory::ChannelPost => "channel_post",
            UpdateCategory::EditedChannelPost => "edited_channel_post",
            UpdateCategory::InlineQuery => "inline_query",
            UpdateCategory::ChosenInlineResult => "chosen_inline_result",
            UpdateCategory::CallbackQuery => "callback_query",
            UpdateCategory::ShippingQuery => "shipping_query",
            UpdateCategory::PreCheckoutQuery => "pre_checkout_query",
            UpdateCategory::Poll => "poll",
            UpdateCategory::PollAnswer => "poll_answer",
            UpdateCategory::MyChatMember => "my_chat_member",
            UpdateCategory::ChatMember => "chat_member",
            UpdateCategory::ChatJoinRequest => "chat_join_request",
        }
    }
}

impl fmt::Display for UpdateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        UpdateCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown update category: {s}")))
    }
}

/// One inbound event.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "Value")]
pub struct Update {
    pub id: UpdateId,
    pub kind: UpdateKind,
}

/// Update payload, tagged by category.
///
/// `Unknown` keeps the raw object of a category this build does not model, so
/// a newer server never turns into a batch that can't be decoded.
#[derive(Clone, Debug)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    ShippingQuery(ShippingQuery),
    PreCheckoutQuery(PreCheckoutQuery),
    Poll(Poll),
    PollAnswer(PollAnswer),
    MyChatMember(ChatMemberUpdated),
    ChatMember(ChatMemberUpdated),
    ChatJoinRequest(ChatJoinRequest),
    Unknown(Value),
}

impl Update {
    pub fn new(id: i64, kind: UpdateKind) -> Self {
        Self {
            id: UpdateId(id),
            kind,
        }
    }

    /// `None` for `UpdateKind::Unknown`.
    pub fn category(&self) -> Option<UpdateCategory> {
        self.kind.category()
    }

    /// The message carried by message-like updates (new/edited, chat/channel).
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            UpdateKind::CallbackQuery(q) => q.message.as_ref(),
            _ => None,
        }
    }
}

impl TryFrom<Value> for Update {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = value else {
            return Err(Error::Decode("update is not an object".to_string()));
        };

        let id = map
            .remove("update_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::Decode("update without a numeric update_id".to_string()))?;

        let Some((key, payload)) = map.into_iter().next() else {
            return Err(Error::Decode(format!("update {id} has no payload")));
        };

        let kind = match key.parse::<UpdateCategory>() {
            Ok(category) => UpdateKind::decode(category, payload)
                .map_err(|e| Error::Decode(format!("update {id} ({key}): {e}")))?,
            Err(_) => {
                let mut raw = serde_json::Map::new();
                raw.insert(key, payload);
                UpdateKind::Unknown(Value::Object(raw))
            }
        };

        Ok(Update::new(id, kind))
    }
}

impl UpdateKind {
    fn decode(category: UpdateCategory, payload: Value) -> serde_json::Result<Self> {
        use serde_json::from_value;

        Ok(match category {
            UpdateCategory::Message => UpdateKind::Message(from_value(payload)?),
            UpdateCategory::EditedMessage => UpdateKind::EditedMessage(from_value(payload)?),
            UpdateCategory::ChannelPost => UpdateKind::ChannelPost(from_value(payload)?),
            UpdateCategory::EditedChannelPost => {
                UpdateKind::EditedChannelPost(from_value(payload)?)
            }
            UpdateCategory::InlineQuery => UpdateKind::InlineQuery(from_value(payload)?),
            UpdateCategory::ChosenInlineResult => {
                UpdateKind::ChosenInlineResult(from_value(payload)?)
            }
            UpdateCategory::CallbackQuery => UpdateKind::CallbackQuery(from_value(payload)?),
            UpdateCategory::ShippingQuery => UpdateKind::ShippingQuery(from_value(payload)?),
            UpdateCategory::PreCheckoutQuery => {
                UpdateKind::PreCheckoutQuery(from_value(payload)?)
            }
            UpdateCategory::Poll => UpdateKind::Poll(from_value(payload)?),
            UpdateCategory::PollAnswer => UpdateKind::PollAnswer(from_value(payload)?),
            UpdateCategory::MyChatMember => UpdateKind::MyChatMember(from_value(payload)?),
            UpdateCategory::ChatMember => UpdateKind::ChatMember(from_value(payload)?),
            UpdateCategory::ChatJoinRequest => UpdateKind::ChatJoinRequest(from_value(payload)?),
        })
    }

    pub fn category(&self) -> Option<UpdateCategory> {
        Some(match self {
            UpdateKind::Message(_) => UpdateCategory::Message,
            UpdateKind::EditedMessage(_) => UpdateCategory::EditedMessage,
            UpdateKind::ChannelPost(_) => UpdateCategory::ChannelPost,
            UpdateKind::EditedChannelPost(_) => UpdateCategory::EditedChannelPost,
            UpdateKind::InlineQuery(_) => UpdateCategory::InlineQuery,
            UpdateKind::ChosenInlineResult(_) => UpdateCategory::ChosenInlineResult,
            UpdateKind::CallbackQuery(_) => UpdateCategory::CallbackQuery,
            UpdateKind::ShippingQuery(_) => UpdateCategory::ShippingQuery,
            UpdateKind::PreCheckoutQuery(_) => UpdateCategory::PreCheckoutQuery,
            UpdateKind::Poll(_) => UpdateCategory::Poll,
            UpdateKind::PollAnswer(_) => UpdateCategory::PollAnswer,
            UpdateKind::MyChatMember(_) => UpdateCategory::MyChatMember,
            UpdateKind::ChatMember(_) => UpdateCategory::ChatMember,
            UpdateKind::ChatJoinRequest(_) => UpdateCategory::ChatJoinRequest,
            UpdateKind::Unknown(_) => return None,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    /// Unix seconds; 0 for inaccessible messages.
    pub date: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub media_group_id: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }

    /// Text, or the media caption.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
    #[serde(default)]
    pub offset: String,
    pub chat_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChosenInlineResult {
    pub result_id: String,
    pub from: User,
    pub query: String,
    pub inline_message_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub inline_message_id: Option<String>,
    #[serde(default)]
    pub chat_instance: String,
    pub data: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ShippingQuery {
    pub id: String,
    pub from: User,
    pub invoice_payload: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub voter_count: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub total_voter_count: i64,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    pub user: Option<User>,
    pub voter_chat: Option<Chat>,
    #[serde(default)]
    pub option_ids: Vec<i32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    pub date: i64,
    pub old_chat_member: ChatMember,
    pub new_chat_member: ChatMember,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatJoinRequest {
    pub chat: Chat,
    pub from: User,
    pub user_chat_id: Option<i64>,
    pub date: i64,
    pub bio: Option<String>,
}
