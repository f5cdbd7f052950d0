//! Telegram Bot API wire types.
//!
//! Mirrors the subset of the Bot API schema this crate receives; the JSON
//! shape is the platform's contract, not ours. Fields absent on the wire
//! decode to `None` and are skipped on re-encode, so an encode/decode round
//! trip preserves every populated field.
//!
//! See <https://core.telegram.org/bots/api#update>.

use serde::{Deserialize, Serialize};

/// An incoming update.
///
/// `update_id` is assigned by Telegram and increases monotonically. At most
/// one of the payload fields is populated; [`Update::payload`] gives a tagged
/// view over whichever it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing identifier assigned by Telegram.
    pub update_id: i64,
    /// New incoming message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// New version of a message that was edited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    /// Incoming callback query from an inline keyboard button.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Tagged view over the populated payload, if any.
    pub fn payload(&self) -> Option<UpdatePayload<'_>> {
        if let Some(msg) = &self.message {
            return Some(UpdatePayload::Message(msg));
        }
        if let Some(msg) = &self.edited_message {
            return Some(UpdatePayload::EditedMessage(msg));
        }
        if let Some(cb) = &self.callback_query {
            return Some(UpdatePayload::CallbackQuery(cb));
        }
        None
    }
}

/// Borrowed view over the single populated payload of an [`Update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdatePayload<'a> {
    /// A new message.
    Message(&'a Message),
    /// An edited message.
    EditedMessage(&'a Message),
    /// A callback query.
    CallbackQuery(&'a CallbackQuery),
}

/// A Telegram message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier within the chat.
    pub message_id: i64,
    /// Sender of the message; absent for channel posts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Date the message was sent, as a unix timestamp.
    #[serde(default)]
    pub date: i64,
    /// Text of the message, for text messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// The message this one replies to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
    /// Special entities (mentions, hashtags, URLs, …) in the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    /// Available sizes of an attached photo.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photo: Vec<PhotoSize>,
    /// An attached general file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    /// Caption for media messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Special entities in the caption.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
    /// A shared contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    /// A shared location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// A Telegram user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: i64,
    /// True if this user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// User's first name.
    pub first_name: String,
    /// User's last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// User's username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// IETF language tag of the user's language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// A Telegram chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: i64,
    /// Chat type: "private", "group", "supergroup" or "channel".
    #[serde(rename = "type")]
    pub kind: String,
    /// Title, for groups, supergroups and channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Username, for private chats and channels when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// First name of the other party in a private chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name of the other party in a private chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// An incoming callback query from an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Unique query identifier.
    pub id: String,
    /// Sender of the query.
    pub from: User,
    /// Message the button was attached to, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<Message>>,
    /// Identifier of the inline message, for inline-mode buttons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    /// Global identifier of the chat the button was sent in.
    #[serde(default)]
    pub chat_instance: String,
    /// Data associated with the pressed button.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A special entity in a text message (hashtag, URL, mention, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    /// Entity type, e.g. "mention", "url", "bot_command".
    #[serde(rename = "type")]
    pub kind: String,
    /// Offset in UTF-16 code units to the start of the entity.
    pub offset: i64,
    /// Length of the entity in UTF-16 code units.
    pub length: i64,
    /// URL opened when the entity is a text link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Mentioned user, for text mentions without a username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Programming language of a "pre" entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One size of a photo or a file/sticker thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    /// Identifier for downloading the file.
    pub file_id: String,
    /// Identifier that is stable across bots.
    pub file_unique_id: String,
    /// Photo width.
    pub width: i64,
    /// Photo height.
    pub height: i64,
    /// File size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

/// A general file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier for downloading the file.
    pub file_id: String,
    /// Identifier that is stable across bots.
    pub file_unique_id: String,
    /// Document thumbnail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<PhotoSize>,
    /// Original filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

/// A phone contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact's phone number.
    pub phone_number: String,
    /// Contact's first name.
    pub first_name: String,
    /// Contact's last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Contact's Telegram user id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Additional data in vCard format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcard: Option<String>,
}

/// A point on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Longitude.
    pub longitude: f64,
    /// Latitude.
    pub latitude: f64,
}
