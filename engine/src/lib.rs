//! Lesson engine for virtue lessons.
//!
//! - **`progress`**: the pure progression reducer ([`LessonState::reduce`])
//! - **`session`**: async driver executing reducer effects against the ledger,
//!   the local lock cache and the clock
//! - **`lock`** / **`ticker`**: cooldown predicate, countdown and its ticker task
//! - **`clock`**: device clock reconciled with server time
//! - **`config`** / **`catalog`**: `~/.ve/config.toml` and lesson definitions

pub mod catalog;
pub mod clock;
pub mod config;
pub mod lock;
pub mod progress;
pub mod session;
pub mod ticker;

pub use catalog::{Catalog, CatalogError};
pub use clock::{ClockSource, LocalClock, ManualClock, SystemClock};
pub use config::{ConfigError, VeConfig, expand_env_vars};
pub use lock::{Cooldown, Countdown, LockWindow};
pub use progress::{Effect, Event, LessonState, Stage, Submission, Transition, reduce};
pub use session::{Collaborators, LessonSession, SessionSettings};
pub use ticker::{CountdownTicker, TICK_PERIOD};
