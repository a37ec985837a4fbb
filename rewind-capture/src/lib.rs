pub mod delivery;
pub mod detectors;
pub mod error;
pub mod host;
pub mod recorder;
pub mod sampler;
pub mod session;
pub mod timers;

pub use delivery::{
    DeliveryError, DeliveryOutcome, FlushMode, HttpOutbox, HttpTransport, MemoryOutbox, Outbox,
    RetryPolicy, Transport,
};
pub use detectors::cart::CartItem;
pub use detectors::vitals::PerfEntry;
pub use error::CaptureError;
pub use host::{HeadlessHost, Hook, Host, KeyValueStore, MemoryStore, MutationRecord};
pub use recorder::{Recorder, RecorderState};
pub use session::{Consent, Session};
