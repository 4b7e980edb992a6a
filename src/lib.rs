// Library interface for linewatch
// Line-indexed access to watched files plus session bookkeeping for viewers

pub mod config;
pub mod event;
pub mod logging;
pub mod reader;
pub mod registry;
pub mod signal;
pub mod watcher;

pub use event::{CloseReason, Notification, SessionId};
pub use reader::{Backend, LineStore, StoreError, StoreOptions};
pub use registry::{RegistryError, RegistryOptions, SessionRegistry};
pub use watcher::{ChangeDetector, DomainEvent, WatchError};
