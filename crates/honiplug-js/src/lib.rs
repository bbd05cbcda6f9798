//! HoniPlug JavaScript Evaluator
//!
//! Runs plugin scripts on QuickJS. Every plugin gets its own runtime and
//! context, so a script can only see the globals the host installs for it.
//!
//! A plugin script looks like this:
//!
//! ```javascript
//! const meta = { name: "weather" };
//!
//! function onInit() {
//!     honi.publish({ status: "online" });
//! }
//!
//! function onUserContent(content) {
//!     if (content.type === "Note" && content.action === "created") {
//!         honi.publish({ noteId: content.id });
//!     }
//! }
//! ```

mod config;
mod evaluator;
mod globals;
mod plugin;
mod runtime;

pub use config::JsConfig;
pub use evaluator::JsEvaluator;
pub use plugin::JsPlugin;
