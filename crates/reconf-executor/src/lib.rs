//! `reconf-executor`: runs a [`reconf_model::ReconfigurationPlan`] against
//! real infrastructure, as concurrently as its dependencies allow.
//!
//! # Architecture
//!
//! ```text
//! Executor::run
//!     │
//!     ▼
//! Run (coordinator)  ← sole owner of the model, the monitor, the remaining
//!     │                 count and the in-flight registry
//!     │  dispatch: ActuatorFactory::get_actuator(model, action)
//!     ▼
//! execution unit     ← tokio task: semaphore permit, then spawn_blocking
//!     │                 (Actuator::execute) supervised by a Watchdog
//!     ▼
//! Report over mpsc   ← exactly one per dispatch: completed, failed or timed out
//!     │
//!     ▼
//! commit: Action::apply + PlanMonitor::commit, then dispatch what it unblocked
//! ```
//!
//! The first failure ends the run. Actuators still executing at that point
//! are abandoned: their outcome is never observed and never applied.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use reconf_executor::{ActuatorFactory, Executor};
//!
//! let mut factory = ActuatorFactory::new();
//! factory.register(MyBootNodeBuilder::default());
//! // ... one builder per action kind used by the plan
//!
//! let result = Executor::new(plan, factory).run().await?;
//! ```

pub mod actuator;
pub mod config;
pub mod error;
pub mod executor;

pub(crate) mod unit;

pub use actuator::{Actuator, ActuatorBuilder, ActuatorFactory};
pub use config::ExecutorConfig;
pub use error::{ActuationError, ExecutorError, InvariantViolation};
pub use executor::Executor;

pub type Result<T> = std::result::Result<T, ExecutorError>;
