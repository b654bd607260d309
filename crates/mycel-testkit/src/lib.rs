//! # Mycel Testkit
//!
//! Testing utilities for Mycel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Codec vectors**: Known inputs with their expected polygon bodies
//! - **Generators**: Proptest strategies for identities, payloads and forests
//! - **Fixtures**: Nodes on a manual clock, ready to register and contribute
//!
//! ## Codec Vectors
//!
//! ```rust
//! use mycel_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, encoded) in verify_all_vectors() {
//!     assert!(ok, "{name}: {encoded}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use mycel_testkit::generators::{draft_from_params, DraftParams};
//!
//! proptest! {
//!     #[test]
//!     fn entry_id_is_deterministic(params: DraftParams) {
//!         let d1 = draft_from_params(&params);
//!         let d2 = draft_from_params(&params);
//!         prop_assert_eq!(d1.compute_id().unwrap(), d2.compute_id().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use mycel_testkit::fixtures::TestNode;
//!
//! let fixture = TestNode::new(1000);
//! let token = fixture.register("node-7").await?;
//! let entry = fixture.contribute(&token, b"hello", None).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_node_fixtures, note_draft, random_payload, seeded_ledger, TestNode};
pub use generators::{build_forest, draft_from_params, DraftParams, ForestParams};
pub use vectors::{all_vectors, export_json, verify_all_vectors, CodecVector};
