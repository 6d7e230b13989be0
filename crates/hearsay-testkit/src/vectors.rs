//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encoding and content hash of one
//! message per kind, so any implementation can be checked byte for byte.

use hearsay_core::{
    AuthTree, ChatKind, ChatPayload, ConnectionKind, ConnectionPayload, GroupPayload, Message,
    ModerationKind, ModerationPayload, PostKind, PostPayload, ProfileKind, ProfilePayload,
    RevertPayload, TreeHash,
};

/// Timestamp shared by every vector (2023-11-14T22:13:20Z), offset per vector.
pub const BASE_TIME: u64 = 1_700_000_000_000;

/// Root of a depth-4 tree over the leaves 1, 2, 3, 4, 5.
pub const TREE_ROOT_DEPTH4_1_TO_5: &str =
    "17747908749829535010742244029493603802924904336395705904631007502873869373811";

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Builds the message under test.
    pub build: fn() -> Message,
    /// Expected canonical encoding (hex).
    pub encoded: &'static str,
    /// Expected SHA-256 of the encoded bytes (hex).
    pub hash: &'static str,
}

fn thread_ref() -> String {
    format!("bob/{}", "ab".repeat(32))
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "post with body",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME,
                    PostPayload::new(PostKind::Default).with_body("hello"),
                )
                .unwrap()
            },
            encoded: "0100018bcfe568000a616c6963650000000000000a68656c6c6f00000000",
            hash: "51439c3ef50b433d2eacad005bc4a9345282f6544bbdd67a1695e1d368908d73",
        },
        GoldenVector {
            name: "cross-post with every field",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME + 1,
                    PostPayload::new(PostKind::CrossPost)
                        .with_topic("rust")
                        .with_title("Hi")
                        .with_body("long read")
                        .with_reference(thread_ref())
                        .with_attachment("https://a.example/1.png")
                        .with_attachment("ipfs://cid"),
                )
                .unwrap()
            },
            encoded: "0103018bcfe568010a616c696365000872757374000448690000126c6f6e6720726561640088626f622f61626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162004a002e68747470733a2f2f612e6578616d706c652f312e706e670014697066733a2f2f636964",
            hash: "c31f43bf0a63125c63c7331be6f4e2002bbcc1c013dd5a0cd94b174a3d6d95d6",
        },
        GoldenVector {
            name: "like",
            build: || {
                Message::new(
                    "carol",
                    BASE_TIME + 2,
                    ModerationPayload::new(ModerationKind::Like, thread_ref()),
                )
                .unwrap()
            },
            encoded: "0200018bcfe568020a6361726f6c0088626f622f616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261620000",
            hash: "814108c3e06848571439551909d7f2e5a57c5ee29ab004941429ee4a25ed79a2",
        },
        GoldenVector {
            name: "custom moderation with multibyte value",
            build: || {
                Message::new(
                    "carol",
                    BASE_TIME + 3,
                    ModerationPayload::new(ModerationKind::Custom, thread_ref())
                        .with_value("\u{1F525}"),
                )
                .unwrap()
            },
            encoded: "02ff018bcfe568030a6361726f6c0088626f622f616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261626162616261620008f09f94a5",
            hash: "5d8994a147abbb7b913208f98a2b2987eb8bc162600779776c5dee20fcd9eecf",
        },
        GoldenVector {
            name: "follow",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME + 4,
                    ConnectionPayload::new(ConnectionKind::Follow, "bob"),
                )
                .unwrap()
            },
            encoded: "0300018bcfe568040a616c6963650006626f62",
            hash: "036cf7e29169053e44198f4d25d093bc6b9e2b5174fdec05592e4eefd64b637e",
        },
        GoldenVector {
            name: "profile name",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME + 5,
                    ProfilePayload::new(ProfileKind::Name, "Alice"),
                )
                .unwrap()
            },
            encoded: "0400018bcfe568050a616c6963650000000a416c696365",
            hash: "f8e22d10b9e8053ca1c82f5a5a44ea4552f12442ebd91ff217b10877a83430a1",
        },
        GoldenVector {
            name: "profile custom field",
            build: || {
                Message::new("alice", BASE_TIME + 6, ProfilePayload::custom("pgp", "0xbeef"))
                    .unwrap()
            },
            encoded: "04ff018bcfe568060a616c6963650006706770000c307862656566",
            hash: "36262e63676d254b5b27ecbdb83b929be9518f68d97dea58696d440d7e649b9c",
        },
        GoldenVector {
            name: "direct chat",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME + 7,
                    ChatPayload::new(ChatKind::Direct, "dm-1")
                        .with_parties("alice", "bob")
                        .with_body("hey"),
                )
                .unwrap()
            },
            encoded: "0500018bcfe568070a616c696365000a616c6963650006626f620008646d2d3100000668657900000000",
            hash: "3058ad68886ca13a314a35eede2c1cf717278398d7fc0e7c38615b7c3a3085ef",
        },
        GoldenVector {
            name: "group data",
            build: || Message::new("alice", BASE_TIME + 8, GroupPayload::new("g1", "opaque")).unwrap(),
            encoded: "0600018bcfe568080a616c6963650004673100000c6f7061717565",
            hash: "17e1c558d05919c1c0b8cbac93e350fa92bb8a51a7152f9cc2aca8b1e53355a3",
        },
        GoldenVector {
            name: "revert",
            build: || {
                Message::new(
                    "alice",
                    BASE_TIME + 9,
                    RevertPayload::new(format!("alice/{}", "cd".repeat(32))),
                )
                .unwrap()
            },
            encoded: "0700018bcfe568090a616c696365008c616c6963652f63646364636463646364636463646364636463646364636463646364636463646364636463646364636463646364636463646364636463646364636463646364",
            hash: "7d2992ac6eb27ef1251e001ad11420af688211429c59a08c1c85b512726135e2",
        },
    ]
}

/// Check one vector: encoding, hash and decode round trip.
pub fn verify_vector(vector: &GoldenVector) -> Result<(), String> {
    let message = (vector.build)();
    let encoded = message.encode();
    if encoded != vector.encoded {
        return Err(format!(
            "{}: encoding mismatch\n  got:  {encoded}\n  want: {}",
            vector.name, vector.encoded
        ));
    }
    let hash = message.hash().to_hex();
    if hash != vector.hash {
        return Err(format!(
            "{}: hash mismatch: got {hash}, want {}",
            vector.name, vector.hash
        ));
    }
    let decoded = Message::decode(vector.encoded).map_err(|e| format!("{}: {e}", vector.name))?;
    if decoded != message {
        return Err(format!("{}: decode does not round-trip", vector.name));
    }
    Ok(())
}

/// Verify all vectors, collecting every failure.
pub fn verify_all_vectors() -> Result<(), Vec<String>> {
    let failures: Vec<String> = all_vectors()
        .iter()
        .filter_map(|v| verify_vector(v).err())
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

/// The reference tree behind [`TREE_ROOT_DEPTH4_1_TO_5`].
pub fn reference_tree() -> AuthTree {
    AuthTree::from_leaves(4, (1..=5).map(TreeHash::from_u64)).unwrap()
}
