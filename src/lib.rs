// Presentation-state crate for the sleep-tracking screen.
// The tracker module holds everything: the night record model, the
// store collaborator, and the screen-state component itself.

pub mod tracker;

pub use tracker::config::Config;
pub use tracker::night::{Night, NightId};
pub use tracker::state::{SleepTracker, TrackerView};
pub use tracker::store::{JsonNightStore, NightStore};
