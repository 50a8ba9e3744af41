//! Incremental rebuild coordination for `folio build --watch`.
//!
//! # Architecture
//!
//! ```text
//! WatcherFactory
//!   - Watcher (src dir + config file)
//!   - Watcher (theme dir, when not bundled)
//!   - FilterRule (include / exclude globs)
//!   - Debouncer (ChangeSet + single timer)
//!         |
//!    classify on quiet period
//!         |
//!    WatchSignal -> callback -> BuildOrchestrator
//! ```
//!
//! Each watcher feeds its own consumption task. All tasks share one
//! debouncer, so bursts spanning several watchers still collapse into a
//! single batch.

mod classify;
mod debouncer;
mod error;
mod event;
mod factory;
mod filter;
mod source;

pub use classify::{ChangeKind, classify, classify_name, is_layout, is_page};
pub use debouncer::{Batch, ChangeSet, DEFAULT_DEBOUNCE_MS, Debouncer, WatchSignal};
pub use error::WatchError;
pub use event::{RawEvent, RawEventKind};
pub use factory::{WatchCallback, WatchContext, WatcherFactory, WatcherId, WatcherRecord};
pub use filter::{FilterRule, filter_paths, is_hidden_updir, is_updir, relative_path};
pub use source::{EventStream, WatchTarget, Watcher, resolve_target};
