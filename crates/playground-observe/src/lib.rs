mod logger;
pub use logger::*;

mod view;
pub use view::{LogObserver, log_event, message_for};
