mod apply;
mod destroy;
mod fingerprint;
mod name;
mod plan;
mod stack;

pub use apply::cmd_apply;
pub use destroy::cmd_destroy;
pub use fingerprint::cmd_fingerprint;
pub use name::cmd_name;
pub use plan::cmd_plan;
pub use stack::{StackArgs, StateArgs};
