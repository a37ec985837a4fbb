pub mod clock;
pub mod driver;
pub mod engine;
pub mod markers;
pub mod overlay;
pub mod replica;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::run_playback;
pub use engine::{PlaybackEngine, PlaybackState};
pub use markers::{EventFilter, Marker};
pub use overlay::{LogOverlay, NoopOverlay, Overlay, Viewport};
pub use replica::{ApplyReport, Replica};
pub use source::{load_file, HttpSessionSource, SourceError};
