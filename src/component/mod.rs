mod command;
mod descriptor;
mod health;
mod hooks;


pub use command::{CommandHooks, CommandSpec};
pub use descriptor::ComponentDescriptor;
pub use health::{HealthStatus, ReadinessReport};
pub use hooks::{ComponentHooks, FnHooks, HealthFn, HookFn, HookPhase, NoopHooks};
