pub mod config;
pub mod dom;
pub mod error;
pub mod identity;
pub mod mask;
pub mod models;
pub mod protocol;
pub mod selector;
pub mod serializer;
pub mod timeline;

pub use config::RewindConfig;
pub use dom::{Document, DomError, NodeKey, NodeKind};
pub use error::RewindError;
pub use identity::IdentityMap;
pub use mask::{MaskPolicy, MASK};
pub use models::mutation::{AddedNode, MutationEntry, RemovedNode};
pub use models::session::SessionInfo;
pub use models::vnode::{NodeType, VirtualNode};
pub use protocol::{Event, EventKind, Payload, SessionRecording, WireBatch};
pub use selector::Selector;
pub use serializer::{SerializeError, Serializer, IGNORE_ATTR};
pub use timeline::{compute_timeline, Timeline, TimelineEvent, TimelineOptions};
