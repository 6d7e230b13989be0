//! Proptest generators for property-based testing.

use proptest::prelude::*;

use hearsay_core::message::MAX_CREATED_AT;
use hearsay_core::{
    ChatKind, ChatPayload, ConnectionKind, ConnectionPayload, GroupPayload, Keypair, Message,
    MessageHash, ModerationKind, ModerationPayload, Payload, PostKind, PostPayload,
    ProfileKind, ProfilePayload, ProofSigner, RevertPayload, SignedMessage, TreeHash,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

pub fn message_hash() -> impl Strategy<Value = MessageHash> {
    any::<[u8; 32]>().prop_map(MessageHash::from_bytes)
}

/// A non-zero tree leaf.
pub fn tree_leaf() -> impl Strategy<Value = TreeHash> {
    message_hash()
        .prop_map(TreeHash::from)
        .prop_filter("zero is the empty sentinel", |leaf| !leaf.is_zero())
}

/// A short plain author name.
pub fn author() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,15}".prop_map(String::from)
}

/// A creation time anywhere in the 48-bit range.
pub fn created_at() -> impl Strategy<Value = u64> {
    0..=MAX_CREATED_AT
}

/// A `author/hash` reference.
pub fn reference() -> impl Strategy<Value = String> {
    (author(), message_hash()).prop_map(|(a, h)| format!("{a}/{}", h.to_hex()))
}

/// Non-empty text, including multibyte characters.
pub fn text(max_chars: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 1..=max_chars).prop_map(|c| c.into_iter().collect())
}

fn optional_text(max_chars: usize) -> impl Strategy<Value = Option<String>> {
    prop::option::of(text(max_chars))
}

fn one_of<T: Copy + std::fmt::Debug + 'static>(all: &'static [T]) -> impl Strategy<Value = T> {
    prop::sample::select(all)
}

pub fn post_payload() -> impl Strategy<Value = PostPayload> {
    (
        one_of(PostKind::ALL),
        optional_text(16),
        optional_text(32),
        optional_text(256),
        prop::option::of(reference()),
        prop::collection::vec("[a-z]{1,8}://[a-z0-9./]{1,40}", 0..4),
    )
        .prop_map(|(kind, topic, title, body, reference, attachments)| PostPayload {
            subkind: kind,
            topic,
            title,
            body,
            reference,
            attachments,
        })
}

pub fn moderation_payload() -> impl Strategy<Value = ModerationPayload> {
    (one_of(ModerationKind::ALL), reference(), optional_text(16)).prop_map(
        |(kind, reference, value)| {
            let payload = ModerationPayload::new(kind, reference);
            match value {
                Some(value) => payload.with_value(value),
                None => payload,
            }
        },
    )
}

pub fn connection_payload() -> impl Strategy<Value = ConnectionPayload> {
    (one_of(ConnectionKind::ALL), author())
        .prop_map(|(kind, target)| ConnectionPayload::new(kind, target))
}

pub fn profile_payload() -> impl Strategy<Value = ProfilePayload> {
    (one_of(ProfileKind::ALL), "[a-z]{1,12}", text(64)).prop_map(|(kind, key, value)| {
        if kind == ProfileKind::Custom {
            ProfilePayload::custom(key, value)
        } else {
            ProfilePayload::new(kind, value)
        }
    })
}

pub fn chat_payload() -> impl Strategy<Value = ChatPayload> {
    (
        one_of(ChatKind::ALL),
        "[a-z0-9-]{1,16}",
        prop::option::of((author(), author())),
        optional_text(128),
        prop::option::of(reference()),
    )
        .prop_map(|(kind, destination, parties, body, reference)| {
            let mut payload = ChatPayload::new(kind, destination);
            if let Some((from, to)) = parties {
                payload = payload.with_parties(from, to);
            }
            if let Some(body) = body {
                payload = payload.with_body(body);
            }
            if let Some(reference) = reference {
                payload = payload.with_reference(reference);
            }
            payload
        })
}

pub fn group_payload() -> impl Strategy<Value = GroupPayload> {
    ("[a-z0-9]{1,16}", text(128)).prop_map(|(group, data)| GroupPayload::new(group, data))
}

pub fn revert_payload() -> impl Strategy<Value = RevertPayload> {
    reference().prop_map(RevertPayload::new)
}

/// A payload of any kind.
pub fn payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        post_payload().prop_map(Payload::from),
        moderation_payload().prop_map(Payload::from),
        connection_payload().prop_map(Payload::from),
        profile_payload().prop_map(Payload::from),
        chat_payload().prop_map(Payload::from),
        group_payload().prop_map(Payload::from),
        revert_payload().prop_map(Payload::from),
    ]
}

/// Parameters for generating a signed message.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub keypair: Keypair,
    pub created_at: u64,
    pub payload: Payload,
}

impl Arbitrary for MessageParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), created_at(), payload())
            .prop_map(|(seed, created_at, payload)| MessageParams {
                keypair: Keypair::from_seed(&seed),
                created_at,
                payload,
            })
            .boxed()
    }
}

impl MessageParams {
    pub fn message(&self) -> Message {
        Message::new(self.keypair.author(), self.created_at, self.payload.clone())
            .expect("generated payloads stay within bounds")
    }

    pub fn signed(&self) -> SignedMessage {
        SignedMessage::sign(self.message(), &self.keypair)
    }
}

/// Any message by an arbitrary plain author, unsigned.
pub fn message() -> impl Strategy<Value = Message> {
    (author(), created_at(), payload()).prop_map(|(author, at, payload)| {
        Message::new(author, at, payload).expect("generated payloads stay within bounds")
    })
}
