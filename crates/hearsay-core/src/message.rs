//! Message: the immutable, content-addressed unit of social data.
//!
//! A message is a shared [`Header`] plus a kind-specific [`Payload`]. The
//! canonical hex encoding is produced once at construction, which validates
//! every field bound; the content hash is SHA-256 over the encoded bytes.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::OnceLock;

use crate::codec::{Decoder, Encoder};
use crate::crypto::{Proof, ProofScheme, ProofSigner, MAX_PROOF_LEN};
use crate::error::{CodecError, Result};
use crate::types::{MessageHash, MessageId};

/// Bound on the author identifier, in hex digits of its UTF-8 encoding.
///
/// The length prefix is two hex digits wide, so an author holds at most
/// 127 bytes. Widening it would change every message encoding and hash.
pub const MAX_AUTHOR_LEN: u64 = 0xFF;
/// Bound on short string fields, in hex digits.
pub const MAX_FIELD_LEN: u64 = 0xFFFF;
/// Bound on bodies and opaque group data, in hex digits.
pub const MAX_BODY_LEN: u64 = 0xFF_FFFF;
/// Bound on a single attachment, in hex digits.
pub const MAX_ATTACHMENT_LEN: u64 = 0xFFFF;
/// Largest representable creation time (48-bit epoch milliseconds).
pub const MAX_CREATED_AT: u64 = (1 << 48) - 1;

const MAX_CODE: u64 = 0xFF;

/// Top-level message kind, the first byte of every encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    Post = 0x01,
    Moderation = 0x02,
    Connection = 0x03,
    Profile = 0x04,
    Chat = 0x05,
    Group = 0x06,
    Revert = 0x07,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        Self::Post,
        Self::Moderation,
        Self::Connection,
        Self::Profile,
        Self::Chat,
        Self::Group,
        Self::Revert,
    ];

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Post),
            0x02 => Some(Self::Moderation),
            0x03 => Some(Self::Connection),
            0x04 => Some(Self::Profile),
            0x05 => Some(Self::Chat),
            0x06 => Some(Self::Group),
            0x07 => Some(Self::Revert),
            _ => None,
        }
    }

    /// Lowercase name, used in index sublevel names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Moderation => "moderation",
            Self::Connection => "connection",
            Self::Profile => "profile",
            Self::Chat => "chat",
            Self::Group => "group",
            Self::Revert => "revert",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! subkind {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn to_u8(self) -> u8 {
                self as u8
            }

            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

subkind! {
    /// Post subtypes.
    PostKind {
        Default = 0x00 => "default",
        Comment = 0x01 => "comment",
        Repost = 0x02 => "repost",
        CrossPost = 0x03 => "cross_post",
    }
}

subkind! {
    /// Moderation subtypes. `Custom` carries its meaning in `value`.
    ModerationKind {
        Like = 0x00 => "like",
        Dislike = 0x01 => "dislike",
        Block = 0x02 => "block",
        ThreadBlock = 0x03 => "thread_block",
        ThreadFollow = 0x04 => "thread_follow",
        ThreadMention = 0x05 => "thread_mention",
        Custom = 0xFF => "custom",
    }
}

subkind! {
    /// Connection (user-to-user edge) subtypes.
    ConnectionKind {
        Follow = 0x00 => "follow",
        Block = 0x01 => "block",
        MemberInvite = 0x02 => "member_invite",
        MemberAccept = 0x03 => "member_accept",
    }
}

subkind! {
    /// Profile fields. `Custom` names its field in `key`.
    ProfileKind {
        Name = 0x00 => "name",
        Bio = 0x01 => "bio",
        Avatar = 0x02 => "avatar",
        Cover = 0x03 => "cover",
        Website = 0x04 => "website",
        Custom = 0xFF => "custom",
    }
}

subkind! {
    ChatKind {
        Direct = 0x00 => "direct",
        PublicRoom = 0x01 => "public_room",
    }
}

subkind! {
    GroupKind {
        Default = 0x00 => "default",
    }
}

subkind! {
    RevertKind {
        Default = 0x00 => "default",
    }
}

/// Per-payload encoding glue. Hashing, JSON and framing live on
/// [`Message`] and are shared by every kind.
pub trait PayloadCodec: Sized {
    const KIND: MessageKind;

    fn subkind_code(&self) -> u8;

    fn subkind_name(&self) -> &'static str;

    /// Write the payload fields in their fixed order.
    fn encode_fields(&self, enc: &mut Encoder) -> Result<()>;

    /// Read the payload fields for a header whose subkind byte is `subkind`.
    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self>;

    /// Canonicalize values with more than one in-memory spelling.
    fn normalize(&mut self) {}

    /// The message this payload points at, if any.
    fn reference(&self) -> Option<&str> {
        None
    }
}

fn unknown_subkind(kind: MessageKind, code: u8) -> CodecError {
    CodecError::Decoding(format!("unknown {kind} subkind 0x{code:02x}"))
}

fn drop_empty(value: &mut Option<String>) {
    if value.as_deref() == Some("") {
        *value = None;
    }
}

/// A post, comment, repost or cross-post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    #[serde(skip)]
    pub subkind: PostKind,
    pub topic: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub reference: Option<String>,
    pub attachments: Vec<String>,
}

impl PostPayload {
    pub fn new(subkind: PostKind) -> Self {
        Self {
            subkind,
            topic: None,
            title: None,
            body: None,
            reference: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}

impl PayloadCodec for PostPayload {
    const KIND: MessageKind = MessageKind::Post;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.optional("topic", self.topic.as_deref(), MAX_FIELD_LEN)?;
        enc.optional("title", self.title.as_deref(), MAX_FIELD_LEN)?;
        enc.optional("body", self.body.as_deref(), MAX_BODY_LEN)?;
        enc.optional("reference", self.reference.as_deref(), MAX_FIELD_LEN)?;
        enc.string_array("attachments", &self.attachments, MAX_ATTACHMENT_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: PostKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            topic: dec.optional("topic", MAX_FIELD_LEN)?,
            title: dec.optional("title", MAX_FIELD_LEN)?,
            body: dec.optional("body", MAX_BODY_LEN)?,
            reference: dec.optional("reference", MAX_FIELD_LEN)?,
            attachments: dec.string_array("attachments", MAX_ATTACHMENT_LEN)?,
        })
    }

    fn normalize(&mut self) {
        drop_empty(&mut self.topic);
        drop_empty(&mut self.title);
        drop_empty(&mut self.body);
        drop_empty(&mut self.reference);
    }

    fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

/// A reaction to another message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationPayload {
    #[serde(skip)]
    pub subkind: ModerationKind,
    pub reference: String,
    pub value: Option<String>,
}

impl ModerationPayload {
    pub fn new(subkind: ModerationKind, reference: impl Into<String>) -> Self {
        Self {
            subkind,
            reference: reference.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl PayloadCodec for ModerationPayload {
    const KIND: MessageKind = MessageKind::Moderation;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.string("reference", &self.reference, MAX_FIELD_LEN)?;
        enc.optional("value", self.value.as_deref(), MAX_FIELD_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: ModerationKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            reference: dec.string("reference", MAX_FIELD_LEN)?,
            value: dec.optional("value", MAX_FIELD_LEN)?,
        })
    }

    fn normalize(&mut self) {
        drop_empty(&mut self.value);
    }

    fn reference(&self) -> Option<&str> {
        Some(&self.reference)
    }
}

/// A directed edge from the author to another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPayload {
    #[serde(skip)]
    pub subkind: ConnectionKind,
    pub target: String,
}

impl ConnectionPayload {
    pub fn new(subkind: ConnectionKind, target: impl Into<String>) -> Self {
        Self {
            subkind,
            target: target.into(),
        }
    }
}

impl PayloadCodec for ConnectionPayload {
    const KIND: MessageKind = MessageKind::Connection;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.string("target", &self.target, MAX_FIELD_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: ConnectionKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            target: dec.string("target", MAX_FIELD_LEN)?,
        })
    }
}

/// Prefix of custom profile field names.
pub const CUSTOM_FIELD_PREFIX: &str = "custom:";

/// An assertion about one profile field of the author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    #[serde(skip)]
    pub subkind: ProfileKind,
    pub key: Option<String>,
    pub value: String,
}

impl ProfilePayload {
    pub fn new(subkind: ProfileKind, value: impl Into<String>) -> Self {
        Self {
            subkind,
            key: None,
            value: value.into(),
        }
    }

    pub fn custom(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            subkind: ProfileKind::Custom,
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// The logical field this message sets: the subkind name, or
    /// `custom:<key>` for custom fields so they never shadow a named one.
    pub fn field(&self) -> String {
        match (self.subkind, self.key.as_deref()) {
            (ProfileKind::Custom, Some(key)) => format!("{CUSTOM_FIELD_PREFIX}{key}"),
            (subkind, _) => subkind.as_str().to_string(),
        }
    }
}

impl PayloadCodec for ProfilePayload {
    const KIND: MessageKind = MessageKind::Profile;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.optional("key", self.key.as_deref(), MAX_FIELD_LEN)?;
        enc.string("value", &self.value, MAX_FIELD_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: ProfileKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            key: dec.optional("key", MAX_FIELD_LEN)?,
            value: dec.string("value", MAX_FIELD_LEN)?,
        })
    }

    fn normalize(&mut self) {
        drop_empty(&mut self.key);
    }
}

/// A chat line addressed to a destination (a direct thread or a room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(skip)]
    pub subkind: ChatKind,
    pub from: Option<String>,
    pub to: Option<String>,
    pub destination: String,
    pub body: Option<String>,
    pub reference: Option<String>,
    pub attachments: Vec<String>,
}

impl ChatPayload {
    pub fn new(subkind: ChatKind, destination: impl Into<String>) -> Self {
        Self {
            subkind,
            from: None,
            to: None,
            destination: destination.into(),
            body: None,
            reference: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_parties(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl PayloadCodec for ChatPayload {
    const KIND: MessageKind = MessageKind::Chat;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.optional("from", self.from.as_deref(), MAX_FIELD_LEN)?;
        enc.optional("to", self.to.as_deref(), MAX_FIELD_LEN)?;
        enc.string("destination", &self.destination, MAX_FIELD_LEN)?;
        enc.optional("body", self.body.as_deref(), MAX_BODY_LEN)?;
        enc.optional("reference", self.reference.as_deref(), MAX_FIELD_LEN)?;
        enc.string_array("attachments", &self.attachments, MAX_ATTACHMENT_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: ChatKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            from: dec.optional("from", MAX_FIELD_LEN)?,
            to: dec.optional("to", MAX_FIELD_LEN)?,
            destination: dec.string("destination", MAX_FIELD_LEN)?,
            body: dec.optional("body", MAX_BODY_LEN)?,
            reference: dec.optional("reference", MAX_FIELD_LEN)?,
            attachments: dec.string_array("attachments", MAX_ATTACHMENT_LEN)?,
        })
    }

    fn normalize(&mut self) {
        drop_empty(&mut self.from);
        drop_empty(&mut self.to);
        drop_empty(&mut self.body);
        drop_empty(&mut self.reference);
    }

    fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

/// Opaque group-scoped data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    #[serde(skip)]
    pub subkind: GroupKind,
    pub group_id: String,
    pub data: String,
}

impl GroupPayload {
    pub fn new(group_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            subkind: GroupKind::Default,
            group_id: group_id.into(),
            data: data.into(),
        }
    }
}

impl PayloadCodec for GroupPayload {
    const KIND: MessageKind = MessageKind::Group;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.string("group_id", &self.group_id, MAX_FIELD_LEN)?;
        enc.string("data", &self.data, MAX_BODY_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: GroupKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            group_id: dec.string("group_id", MAX_FIELD_LEN)?,
            data: dec.string("data", MAX_BODY_LEN)?,
        })
    }
}

/// Retracts one of the author's earlier messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertPayload {
    #[serde(skip)]
    pub subkind: RevertKind,
    pub reference: String,
}

impl RevertPayload {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            subkind: RevertKind::Default,
            reference: reference.into(),
        }
    }
}

impl PayloadCodec for RevertPayload {
    const KIND: MessageKind = MessageKind::Revert;

    fn subkind_code(&self) -> u8 {
        self.subkind.to_u8()
    }

    fn subkind_name(&self) -> &'static str {
        self.subkind.as_str()
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        enc.string("reference", &self.reference, MAX_FIELD_LEN)
    }

    fn decode_fields(subkind: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            subkind: RevertKind::from_u8(subkind)
                .ok_or_else(|| unknown_subkind(Self::KIND, subkind))?,
            reference: dec.string("reference", MAX_FIELD_LEN)?,
        })
    }

    fn reference(&self) -> Option<&str> {
        Some(&self.reference)
    }
}

/// Kind-specific message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Post(PostPayload),
    Moderation(ModerationPayload),
    Connection(ConnectionPayload),
    Profile(ProfilePayload),
    Chat(ChatPayload),
    Group(GroupPayload),
    Revert(RevertPayload),
}

macro_rules! dispatch {
    ($payload:expr, $inner:ident => $body:expr) => {
        match $payload {
            Payload::Post($inner) => $body,
            Payload::Moderation($inner) => $body,
            Payload::Connection($inner) => $body,
            Payload::Profile($inner) => $body,
            Payload::Chat($inner) => $body,
            Payload::Group($inner) => $body,
            Payload::Revert($inner) => $body,
        }
    };
}

macro_rules! payload_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(payload: $ty) -> Self {
                    Payload::$variant(payload)
                }
            }
        )+
    };
}

payload_from! {
    Post(PostPayload),
    Moderation(ModerationPayload),
    Connection(ConnectionPayload),
    Profile(ProfilePayload),
    Chat(ChatPayload),
    Group(GroupPayload),
    Revert(RevertPayload),
}

fn kind_of<P: PayloadCodec>(_: &P) -> MessageKind {
    P::KIND
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        dispatch!(self, p => kind_of(p))
    }

    pub fn subkind_code(&self) -> u8 {
        dispatch!(self, p => p.subkind_code())
    }

    pub fn subkind_name(&self) -> &'static str {
        dispatch!(self, p => p.subkind_name())
    }

    pub fn reference(&self) -> Option<&str> {
        dispatch!(self, p => p.reference())
    }

    fn encode_fields(&self, enc: &mut Encoder) -> Result<()> {
        dispatch!(self, p => p.encode_fields(enc))
    }

    fn normalize(&mut self) {
        dispatch!(self, p => p.normalize())
    }

    fn to_json(&self) -> Value {
        dispatch!(self, p => serde_json::to_value(p).unwrap_or_default())
    }

    fn decode_fields(header: &Header, dec: &mut Decoder<'_>) -> Result<Self> {
        let subkind = header.subkind;
        Ok(match header.kind {
            MessageKind::Post => PostPayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Moderation => ModerationPayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Connection => ConnectionPayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Profile => ProfilePayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Chat => ChatPayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Group => GroupPayload::decode_fields(subkind, dec)?.into(),
            MessageKind::Revert => RevertPayload::decode_fields(subkind, dec)?.into(),
        })
    }
}

/// The fields shared by every message, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageKind,
    pub subkind: u8,
    pub created_at: u64,
    pub author: String,
}

impl Header {
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.number("kind", self.kind.to_u8() as u64, MAX_CODE)?;
        enc.number("subkind", self.subkind as u64, MAX_CODE)?;
        enc.number("created_at", self.created_at, MAX_CREATED_AT)?;
        enc.string("author", &self.author, MAX_AUTHOR_LEN)
    }

    /// The single header decoder used for every kind. Assigns all four
    /// fields before any payload decoding happens.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let code = dec.number("kind", MAX_CODE)? as u8;
        let kind = MessageKind::from_u8(code)
            .ok_or_else(|| CodecError::Decoding(format!("unknown kind 0x{code:02x}")))?;
        let subkind = dec.number("subkind", MAX_CODE)? as u8;
        let created_at = dec.number("created_at", MAX_CREATED_AT)?;
        let author = dec.string("author", MAX_AUTHOR_LEN)?;
        Ok(Self {
            kind,
            subkind,
            created_at,
            author,
        })
    }
}

/// An immutable message. Construction validates every bound, so a
/// `Message` value always has a canonical encoding.
#[derive(Clone)]
pub struct Message {
    created_at: u64,
    author: String,
    payload: Payload,
    bytes: Vec<u8>,
    hash: OnceLock<MessageHash>,
}

impl Message {
    pub fn new(
        author: impl Into<String>,
        created_at: u64,
        payload: impl Into<Payload>,
    ) -> Result<Self> {
        let mut payload = payload.into();
        payload.normalize();

        let header = Header {
            kind: payload.kind(),
            subkind: payload.subkind_code(),
            created_at,
            author: author.into(),
        };
        let mut enc = Encoder::new();
        header.encode(&mut enc)?;
        payload.encode_fields(&mut enc)?;
        let bytes = hex::decode(enc.finish())
            .map_err(|e| CodecError::Encoding(format!("non-canonical encoding: {e}")))?;

        Ok(Self {
            created_at,
            author: header.author,
            payload,
            bytes,
            hash: OnceLock::new(),
        })
    }

    /// Decode a message from its hex encoding. The whole input must be
    /// consumed.
    pub fn decode(hex: &str) -> Result<Self> {
        let mut dec = Decoder::new(hex);
        let message = Self::decode_from(&mut dec)?;
        dec.finish()?;
        Ok(message)
    }

    fn decode_from(dec: &mut Decoder<'_>) -> Result<Self> {
        let header = Header::decode(dec)?;
        let payload = Payload::decode_fields(&header, dec)?;
        Self::new(header.author, header.created_at, payload)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&hex::encode(bytes))
    }

    /// The canonical hex encoding.
    pub fn encode(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 over the encoded bytes. Computed once.
    pub fn hash(&self) -> MessageHash {
        *self.hash.get_or_init(|| MessageHash::digest(&self.bytes))
    }

    pub fn message_id(&self) -> MessageId {
        MessageId::new(self.author.clone(), self.hash())
    }

    pub fn header(&self) -> Header {
        Header {
            kind: self.kind(),
            subkind: self.subkind(),
            created_at: self.created_at,
            author: self.author.clone(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn subkind(&self) -> u8 {
        self.payload.subkind_code()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn reference(&self) -> Option<&str> {
        self.payload.reference()
    }

    pub fn as_post(&self) -> Option<&PostPayload> {
        match &self.payload {
            Payload::Post(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_moderation(&self) -> Option<&ModerationPayload> {
        match &self.payload {
            Payload::Moderation(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_connection(&self) -> Option<&ConnectionPayload> {
        match &self.payload {
            Payload::Connection(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&ProfilePayload> {
        match &self.payload {
            Payload::Profile(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatPayload> {
        match &self.payload {
            Payload::Chat(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupPayload> {
        match &self.payload {
            Payload::Group(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_revert(&self) -> Option<&RevertPayload> {
        match &self.payload {
            Payload::Revert(p) => Some(p),
            _ => None,
        }
    }

    /// JSON view for APIs and logs.
    pub fn to_json(&self) -> Value {
        json!({
            "messageId": self.message_id().to_string(),
            "hash": self.hash().to_hex(),
            "type": self.kind().as_str(),
            "subtype": self.payload.subkind_name(),
            "createdAt": self.created_at,
            "author": self.author,
            "payload": self.payload.to_json(),
        })
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Message {}

impl std::hash::Hash for Message {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("subkind", &self.payload.subkind_name())
            .field("created_at", &self.created_at)
            .field("author", &self.author)
            .field("hash", &self.hash())
            .finish()
    }
}

/// A message together with its (optional) author proof.
///
/// Wire form: the message encoding, then optionally
/// `scheme(1B) | proof data (length-prefixed)`. The proof is outside the
/// content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    message: Message,
    proof: Option<Proof>,
}

impl SignedMessage {
    pub fn new(message: Message, proof: Option<Proof>) -> Self {
        Self { message, proof }
    }

    pub fn unsigned(message: Message) -> Self {
        Self::new(message, None)
    }

    /// Attach a proof produced by `signer` over the message hash.
    pub fn sign<S: ProofSigner + ?Sized>(message: Message, signer: &S) -> Self {
        let proof = signer.sign(&message.hash());
        Self::new(message, Some(proof))
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn hash(&self) -> MessageHash {
        self.message.hash()
    }

    pub fn into_parts(self) -> (Message, Option<Proof>) {
        (self.message, self.proof)
    }

    pub fn encode(&self) -> String {
        let mut enc = Encoder::new();
        enc.raw(&self.message.encode());
        if let Some(proof) = &self.proof {
            // Proof::new enforces the data bound.
            let data = hex::encode(proof.data());
            enc.raw(&format!("{:02x}{:04x}{}", proof.scheme().to_u8(), data.len(), data));
        }
        enc.finish()
    }

    pub fn decode(hex: &str) -> Result<Self> {
        let mut dec = Decoder::new(hex);
        let message = Message::decode_from(&mut dec)?;
        let proof = if dec.is_empty() {
            None
        } else {
            let code = dec.number("proof_scheme", MAX_CODE)? as u8;
            let scheme = ProofScheme::from_u8(code).ok_or_else(|| {
                CodecError::Decoding(format!("unknown proof scheme 0x{code:02x}"))
            })?;
            let data = dec.bytes("proof", MAX_PROOF_LEN)?;
            Some(Proof::new(scheme, data)?)
        };
        dec.finish()?;
        Ok(Self { message, proof })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.message.to_bytes();
        if let Some(proof) = &self.proof {
            bytes.push(proof.scheme().to_u8());
            let len = (proof.data().len() * 2) as u16;
            bytes.extend_from_slice(&len.to_be_bytes());
            bytes.extend_from_slice(proof.data());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&hex::encode(bytes))
    }
}

impl From<Message> for SignedMessage {
    fn from(message: Message) -> Self {
        Self::unsigned(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    const T: u64 = 1_700_000_000_000;

    fn roundtrip(message: &Message) {
        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(&decoded, message);
        assert_eq!(decoded.payload(), message.payload());
        assert_eq!(decoded.hash(), message.hash());
    }

    #[test]
    fn test_post_golden_vector() {
        let message = Message::new("alice", T, PostPayload::new(PostKind::Default).with_body("hello"))
            .unwrap();
        assert_eq!(
            message.encode(),
            "0100018bcfe568000a616c6963650000000000000a68656c6c6f00000000"
        );
        assert_eq!(
            message.hash().to_hex(),
            "51439c3ef50b433d2eacad005bc4a9345282f6544bbdd67a1695e1d368908d73"
        );
        assert_eq!(message.message_id().to_string(), format!("alice/{}", message.hash()));
    }

    #[test]
    fn test_roundtrip_every_kind() {
        let messages = vec![
            Message::new(
                "alice",
                T,
                PostPayload::new(PostKind::CrossPost)
                    .with_topic("rust")
                    .with_title("hi")
                    .with_body("body text")
                    .with_reference("bob/abcd")
                    .with_attachment("https://example.org/a.png"),
            ),
            Message::new(
                "alice",
                T,
                ModerationPayload::new(ModerationKind::Custom, "bob/abcd").with_value("🔥"),
            ),
            Message::new("alice", T, ConnectionPayload::new(ConnectionKind::Follow, "bob")),
            Message::new("alice", T, ProfilePayload::custom("pgp", "0xdead")),
            Message::new(
                "alice",
                T,
                ChatPayload::new(ChatKind::Direct, "room-1")
                    .with_parties("alice", "bob")
                    .with_body("hey"),
            ),
            Message::new("alice", T, GroupPayload::new("g1", "opaque")),
            Message::new("alice", T, RevertPayload::new("alice/abcd")),
        ];
        for message in messages {
            roundtrip(&message.unwrap());
        }
    }

    #[test]
    fn test_empty_optionals_normalized() {
        let mut payload = PostPayload::new(PostKind::Default).with_body("x");
        payload.title = Some(String::new());
        let message = Message::new("alice", T, payload).unwrap();
        assert_eq!(message.as_post().unwrap().title, None);
        roundtrip(&message);
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let base = Message::new("alice", T, PostPayload::new(PostKind::Default).with_body("x"))
            .unwrap();
        let variants = [
            Message::new("bob", T, PostPayload::new(PostKind::Default).with_body("x")),
            Message::new("alice", T + 1, PostPayload::new(PostKind::Default).with_body("x")),
            Message::new("alice", T, PostPayload::new(PostKind::Repost).with_body("x")),
            Message::new("alice", T, PostPayload::new(PostKind::Default).with_body("y")),
        ];
        for variant in variants {
            assert_ne!(variant.unwrap().hash(), base.hash());
        }
    }

    #[test]
    fn test_author_bound() {
        let author = "a".repeat(128);
        let err = Message::new(author, T, RevertPayload::new("x")).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(_)));
        assert!(Message::new("a".repeat(127), T, RevertPayload::new("x")).is_ok());

        // Counted in UTF-8 bytes, not characters.
        assert!(Message::new("é".repeat(63), T, RevertPayload::new("x")).is_ok());
        assert!(Message::new("é".repeat(64), T, RevertPayload::new("x")).is_err());
    }

    #[test]
    fn test_created_at_bound() {
        assert!(Message::new("a", MAX_CREATED_AT, RevertPayload::new("x")).is_ok());
        assert!(Message::new("a", MAX_CREATED_AT + 1, RevertPayload::new("x")).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let valid = Message::new("alice", T, RevertPayload::new("x")).unwrap().encode();
        assert!(Message::decode("").is_err());
        assert!(Message::decode(&valid[..valid.len() - 2]).is_err());
        assert!(Message::decode(&format!("{valid}00")).is_err());
        assert!(Message::decode(&format!("09{}", &valid[2..])).is_err());
        assert!(Message::decode(&format!("0709{}", &valid[4..])).is_err());
    }

    #[test]
    fn test_signed_message_roundtrip() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let message = Message::new(
            keypair.author(),
            T,
            PostPayload::new(PostKind::Default).with_body("signed"),
        )
        .unwrap();
        let signed = SignedMessage::sign(message.clone(), &keypair);

        let wire = signed.encode();
        assert!(wire.starts_with(&message.encode()));
        let decoded = SignedMessage::decode(&wire).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.hash(), message.hash());
        assert_eq!(SignedMessage::from_bytes(&signed.to_bytes()).unwrap(), signed);

        let unsigned = SignedMessage::unsigned(message.clone());
        assert_eq!(unsigned.encode(), message.encode());
        assert!(SignedMessage::decode(&unsigned.encode()).unwrap().proof().is_none());
    }

    #[test]
    fn test_to_json() {
        let message = Message::new("alice", T, ConnectionPayload::new(ConnectionKind::Block, "bob"))
            .unwrap();
        let json = message.to_json();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["subtype"], "block");
        assert_eq!(json["author"], "alice");
        assert_eq!(json["payload"]["target"], "bob");
        assert_eq!(json["hash"], message.hash().to_hex());
    }

    #[test]
    fn test_profile_field_names() {
        assert_eq!(ProfilePayload::new(ProfileKind::Bio, "x").field(), "bio");
        assert_eq!(ProfilePayload::custom("pgp", "x").field(), "custom:pgp");
        assert_eq!(ProfilePayload::custom("name", "x").field(), "custom:name");
    }

    #[test]
    fn test_kind_codes_roundtrip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_u8(kind.to_u8()), Some(kind));
        }
        for subkind in ModerationKind::ALL {
            assert_eq!(ModerationKind::from_u8(subkind.to_u8()), Some(*subkind));
        }
        assert_eq!(PostKind::from_u8(0x04), None);
    }
}
