//! # Hearsay Testkit
//!
//! Testing utilities for hearsay.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known messages with their expected encodings and hashes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Signing authors and in-memory node networks
//!
//! ## Golden Vectors
//!
//! ```rust
//! use hearsay_testkit::vectors::{all_vectors, verify_vector};
//!
//! for vector in all_vectors() {
//!     verify_vector(&vector).unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use hearsay_testkit::generators::MessageParams;
//!
//! proptest! {
//!     #[test]
//!     fn hash_is_deterministic(params: MessageParams) {
//!         prop_assert_eq!(params.message().hash(), params.message().hash());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use hearsay_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let post = fixture.make_post("hello");
//! assert_eq!(post.message().author(), fixture.author());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{eventually, multi_party_fixtures, TestFixture, TestNetwork};
pub use generators::MessageParams;
pub use vectors::{all_vectors, verify_all_vectors, verify_vector, GoldenVector};
