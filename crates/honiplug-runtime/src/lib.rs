//! HoniPlug Runtime - Plugin lifecycle and output fan-out
//!
//! This crate turns a directory of independently authored plugin scripts into
//! a supervised set of long-lived components:
//!
//! - `loader`: discovers plugin sources and hands them to a [`ScriptEvaluator`]
//! - `capability`: builds the identity-scoped publish capability for each plugin
//! - `supervisor`: binds capabilities, runs `on_init`, commits the registry
//! - `registry`: the generation-stamped set of ready plugins
//! - `dispatcher`: fans user content events out to every ready plugin
//! - `bus`: the in-process publish/subscribe transport plugin output travels on
//!
//! Plugin hooks are synchronous and run script code, so none of them run on
//! an async worker. The supervisor moves its bind and init stage onto the
//! blocking pool itself. [`EventDispatcher`] methods are plain blocking calls
//! that async callers wrap in `tokio::task::spawn_blocking`.
//!
//! The scripting language is not part of this crate. Anything that can turn
//! source text into a [`HoniPlug`] implementation can be plugged in as an
//! evaluator.

mod bus;
mod capability;
mod dispatcher;
mod error;
mod evaluator;
mod loader;
mod plugin;
mod registry;
mod supervisor;

#[cfg(test)]
mod testing;

pub use bus::*;
pub use capability::*;
pub use dispatcher::*;
pub use error::*;
pub use evaluator::*;
pub use loader::*;
pub use plugin::*;
pub use registry::*;
pub use supervisor::*;
