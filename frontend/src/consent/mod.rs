//! Cookie consent: the persisted record, its validation, and the gates that
//! switch optional integrations on and off.

pub mod clock;
pub mod error;
pub mod gate;
pub mod record;
pub mod storage;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ConsentError;
pub use gate::{FeatureGates, Integration, ScriptIntegration};
pub use record::{Category, ConsentChoice, ConsentRecord};
pub use storage::{BrowserStorage, ConsentStorage, MemoryStorage};
pub use store::{ConsentStore, ListenerId};
