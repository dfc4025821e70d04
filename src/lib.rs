//! Publish/subscribe transport admin for a message-oriented socket transport
//!
//! The admin scores publishers and subscribers for a host framework, creates
//! one [`TopicSender`] and one [`TopicReceiver`] per `(scope, topic)` on
//! demand, keeps receivers dialed to every discovered publisher, and frames
//! messages with a versioned header so incompatible producers are dropped
//! instead of misread.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pubsub_socket_admin::{AdminConfig, Properties, TransportAdmin};
//! use pubsub_socket_admin::serializer::{MessageVersion, RawSerializer, SerializerInfo};
//!
//! # async fn run() -> pubsub_socket_admin::Result<()> {
//! let admin = TransportAdmin::new(AdminConfig::default()).await?;
//! admin.add_serializer(
//!     SerializerInfo::new("raw", 1, "example.Blob", MessageVersion::new(1, 0)),
//!     Arc::new(RawSerializer),
//! );
//!
//! let endpoint = admin
//!     .setup_topic_sender(Some("sensors"), "temperature", &Properties::new(), "raw")
//!     .await?;
//! // Hand `endpoint` to the discovery layer of every other node
//! # let _ = endpoint;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod endpoint;
pub mod error;
pub mod matching;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod serializer;
pub mod server;
pub mod stats;
pub mod sync;

pub use admin::{AdminConfig, TransportAdmin};
pub use endpoint::{EndpointRole, Properties};
pub use error::{Error, Result};
pub use matching::{ComponentId, MatchOutcome, MatchScores, TopicPropertiesProvider};
pub use receiver::{Subscriber, TopicReceiver};
pub use sender::{PublisherHandle, TopicSender};
pub use serializer::{Message, MessageSerializer};
