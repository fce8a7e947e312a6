//! rlinit - priority and runlevel ordered init
//!
//! A service supervisor that can run as PID 1:
//! - Loads service objects from `<config-dir>/objects/*.object`
//! - Starts and stops them one at a time in priority order per runlevel
//! - Tracks the process each start command leaves behind
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        rlinit daemon (signals, shutdown)         │
//! ├─────────────────────────────────────────────────┤
//! │              Runlevel orchestrator               │
//! ├─────────────────────────────────────────────────┤
//! │             Lifecycle state machine              │
//! ├─────────────────────────────────────────────────┤
//! │   Execution engine    │    Service registry      │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod console;
pub mod manager;
pub mod objects;
pub mod outcome;
pub mod pid1;
pub mod settings;

pub use console::{ConsoleReporter, Reporter};
pub use manager::{Manager, ManagerError, Registry};
pub use objects::{load_registry, ServiceObject};
pub use outcome::Outcome;
pub use settings::Settings;
