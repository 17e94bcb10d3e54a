pub mod event;
pub mod finding;

pub use event::{AlarmEvent, AlarmState};
pub use finding::{Finding, LogRecord, Outcome};
