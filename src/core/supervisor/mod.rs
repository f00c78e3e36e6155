pub mod classifier;
pub mod handle;
pub mod log_buffer;
pub mod observers;
pub mod server;

pub use classifier::{IndicatorSet, LineEvent, LogClassifier};
pub use handle::{OutputLines, ProcessHandle};
pub use log_buffer::{LogBuffer, LOG_CAPACITY};
pub use observers::{Callback, Observers, ServerObservers};
pub use server::{ManagedServer, ServerInfo, DEFAULT_GRACE_PERIOD};
