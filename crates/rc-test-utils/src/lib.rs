//! # Room Client Test Utilities
//!
//! Mocks and fixtures for exercising a `SessionActor` without a signaling
//! server, a media stack or a rendering surface.
//!
//! ## Modules
//!
//! - `mock_signaling` - Scripted request/ack transport that records traffic
//! - `mock_media` - In-memory media engine with observable resources
//! - `recording_ui` - UI adapter that records every command
//! - `fixtures` - Profiles, peers, snapshots, server pushes and a session harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let signaling = MockSignaling::new()
//!         .with_room_peers(&[TestPeer::new("s-1", "Alice")]);
//!     let harness = TestSession::builder()
//!         .signaling(signaling)
//!         .spawn();
//!
//!     harness.handle.join(learner_profile("Bob")).await.unwrap();
//!     harness.push.peer_left("s-1");
//! }
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_signaling;
pub mod recording_ui;

pub use fixtures::*;
pub use mock_media::*;
pub use mock_signaling::*;
pub use recording_ui::*;
