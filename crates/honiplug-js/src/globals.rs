//! JavaScript Global Objects
//!
//! Registers the `honi` global object and `console` in a plugin context.
//! Logging is available as soon as the script is evaluated; `honi.publish`
//! is only added once the host binds capabilities.

use std::sync::Arc;

use parking_lot::Mutex;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Object, Result as JsResult};

use honiplug_runtime::{BusError, PluginPublisher};

/// Native publish entry point, removed from the global scope once wrapped
const NATIVE_PUBLISH: &str = "__honiPublish";

/// Wraps the native publish function and freezes `honi`
const INSTALL_PUBLISH: &str = r#"
(function () {
    const native = globalThis.__honiPublish;
    delete globalThis.__honiPublish;
    const honi = globalThis.honi;
    Object.defineProperty(honi, "publish", {
        value: function publish(payload) {
            return native(JSON.stringify(payload === undefined ? null : payload));
        },
        enumerable: true,
    });
    Object.freeze(honi);
    Object.defineProperty(globalThis, "honi", {
        value: honi,
        writable: false,
        configurable: false,
    });
})();
"#;

/// Register the `honi` global object and its logging methods
pub(crate) fn register_honi_globals(ctx: &Ctx<'_>, plugin: &str) -> JsResult<()> {
    let globals = ctx.globals();
    let honi = Object::new(ctx.clone())?;

    register_console(ctx, plugin)?;

    let name: Arc<str> = Arc::from(plugin);

    let p = name.clone();
    honi.set(
        "log",
        Function::new(ctx.clone(), move |msg: Coerced<String>| {
            tracing::info!(target: "honiplug.js", plugin = %p, "{}", msg.0);
        })?,
    )?;

    let p = name.clone();
    honi.set(
        "debug",
        Function::new(ctx.clone(), move |msg: Coerced<String>| {
            tracing::debug!(target: "honiplug.js", plugin = %p, "{}", msg.0);
        })?,
    )?;

    let p = name.clone();
    honi.set(
        "warn",
        Function::new(ctx.clone(), move |msg: Coerced<String>| {
            tracing::warn!(target: "honiplug.js", plugin = %p, "{}", msg.0);
        })?,
    )?;

    let p = name;
    honi.set(
        "error",
        Function::new(ctx.clone(), move |msg: Coerced<String>| {
            tracing::error!(target: "honiplug.js", plugin = %p, "{}", msg.0);
        })?,
    )?;

    globals.set("honi", honi)?;

    Ok(())
}

fn join(args: Rest<Coerced<String>>) -> String {
    args.0
        .into_iter()
        .map(|a| a.0)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Register the console object with log, info, warn, error, debug methods
fn register_console(ctx: &Ctx<'_>, plugin: &str) -> JsResult<()> {
    let console = Object::new(ctx.clone())?;
    let name: Arc<str> = Arc::from(plugin);

    let p = name.clone();
    console.set(
        "log",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::info!(target: "honiplug.js.console", plugin = %p, "{}", join(args));
        })?,
    )?;

    let p = name.clone();
    console.set(
        "info",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::info!(target: "honiplug.js.console", plugin = %p, "{}", join(args));
        })?,
    )?;

    let p = name.clone();
    console.set(
        "warn",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::warn!(target: "honiplug.js.console", plugin = %p, "{}", join(args));
        })?,
    )?;

    let p = name.clone();
    console.set(
        "error",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::error!(target: "honiplug.js.console", plugin = %p, "{}", join(args));
        })?,
    )?;

    let p = name;
    console.set(
        "debug",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::debug!(target: "honiplug.js.console", plugin = %p, "{}", join(args));
        })?,
    )?;

    ctx.globals().set("console", console)?;

    Ok(())
}

/// Add `honi.publish` bound to `publisher` and freeze the `honi` object
///
/// A rejected publish throws inside the calling hook. The bus error is also
/// stored in `fault` so the host can classify the hook failure.
pub(crate) fn install_publisher<'js>(
    ctx: &Ctx<'js>,
    publisher: PluginPublisher,
    fault: Arc<Mutex<Option<BusError>>>,
) -> JsResult<()> {
    let native = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, payload: String| -> JsResult<usize> {
            let body: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| Exception::throw_type(&ctx, &format!("payload is not JSON: {e}")))?;

            publisher.publish(body).map_err(|e| {
                let message = e.to_string();
                *fault.lock() = Some(e);
                Exception::throw_message(&ctx, &message)
            })
        },
    )?;

    ctx.globals().set(NATIVE_PUBLISH, native)?;
    ctx.eval::<(), _>(INSTALL_PUBLISH)
}
