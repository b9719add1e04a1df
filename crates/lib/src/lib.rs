//! provis-lib: the command layer of provis.
//!
//! Provisioning steps on a target host are expressed as values an
//! orchestration engine can diff, order, apply and destroy:
//! - `CommandSpec`: create / update / delete text plus replacement triggers
//! - `Runner`: binds specs to one target, behind an optional readiness gate
//! - `PackageInstaller` and `ComposeManager`: idempotent bootstrap steps
//! - `PlanGraph`: an in-process engine that records nodes as a DAG
//!
//! `execute` applies a recorded plan through a `Transport` and `snapshot`
//! keeps what was applied for the next diff.

pub mod command;
pub mod compose;
pub mod connection;
pub mod consts;
pub mod engine;
pub mod execute;
pub mod os;
pub mod package;
pub mod runner;
pub mod snapshot;
pub mod util;
