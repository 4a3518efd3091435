//! Shared building blocks for the integration e2e runner.
//!
//! - [`spec`]: scenario spec documents and metric catalogs
//! - [`value`] and [`compare`]: value coercion and result comparison
//! - [`retry`]: fixed-delay retry of assertion batches
//! - [`settings`]: validated runtime settings
//! - [`command`]: shell commands run around scenarios
//! - [`logging`]: tracing subscriber setup

pub mod command;
pub mod compare;
pub mod logging;
pub mod retry;
pub mod settings;
pub mod spec;
pub mod value;

pub use command::{CommandError, CommandLogStyle, CommandRunner, ShellCommandRunner};
pub use compare::{CompareError, compare_bounded, compare_exact};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use retry::{RetryError, RetryPolicy, RetryableError, retry, retry_with_sleep};
pub use settings::{Region, Settings, SettingsError, SettingsOptions};
pub use spec::{Definition, Scenario, SpecError, Tests};
pub use value::{Value, coerce};
