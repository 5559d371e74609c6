//! Command dispatch and execution core for the Warden bot.
//!
//! The pipeline resolves an inbound chat line to a registered command,
//! layers permission and cooldown checks over it, runs the handler under a
//! timeout with bounded retries, and records the outcome for the dashboard.
//!
//! Every piece of state is owned by a component instance and injected through
//! constructors; nothing here is process-global.

pub mod audit;
pub mod context;
pub mod cooldown;
pub mod executor;
pub mod handler;
pub mod history;
pub mod manager;
pub mod permissions;
pub mod registry;
pub mod stats;
pub mod sweeper;

pub use audit::{AuditEntry, AuditFilter, AuditLog, DecisionSource};
pub use context::{CapabilitySource, InvocationContext};
pub use cooldown::{CooldownKind, CooldownManager, CooldownRecord, CooldownVerdict};
pub use executor::CommandExecutor;
pub use handler::{CommandHandler, HandlerError, HandlerErrorKind, HandlerResult, Invocation, Reply};
pub use history::{ExecutionHistory, ExecutionRecord, HistoryFilter};
pub use manager::{CommandManager, CommandSummary};
pub use permissions::{PermissionGrant, PermissionManager, RoleSelector};
pub use registry::{Category, CommandDescriptor, CommandRegistry};
pub use stats::DispatchStats;
pub use sweeper::Sweeper;
