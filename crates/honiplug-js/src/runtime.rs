//! QuickJS Engine Helpers
//!
//! Engine construction, exception extraction and JSON to JS conversion shared
//! by the plugin wrapper.

use rquickjs::{Array, Context, Ctx, IntoJs, Object, Runtime, Value as JsValue};

use crate::config::JsConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Create an isolated runtime and full context with the configured limits
pub(crate) fn new_engine(config: &JsConfig) -> rquickjs::Result<(Runtime, Context)> {
    let runtime = Runtime::new()?;
    if config.memory_limit > 0 {
        runtime.set_memory_limit(config.memory_limit);
    }
    if config.max_stack_size > 0 {
        runtime.set_max_stack_size(config.max_stack_size);
    }
    let context = Context::full(&runtime)?;
    Ok((runtime, context))
}

/// Options for evaluating a whole plugin file
pub(crate) fn script_options() -> rquickjs::context::EvalOptions {
    let mut options = rquickjs::context::EvalOptions::default();
    options.global = true;
    options.strict = true;
    options.backtrace_barrier = true;
    options
}

// ─────────────────────────────────────────────────────────────────────────────
// Exceptions
// ─────────────────────────────────────────────────────────────────────────────

/// Turn an engine error into a readable message
///
/// For thrown exceptions this takes the pending exception off the context,
/// so it must be called before anything else runs on `ctx`.
pub(crate) fn error_message(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }

    let caught = ctx.catch();

    if let Some(exception) = caught.as_exception() {
        return exception
            .message()
            .unwrap_or_else(|| "uncaught exception".to_string());
    }

    if let Some(s) = caught.as_string() {
        if let Ok(s) = s.to_string() {
            return s;
        }
    }

    format!("uncaught {:?}", caught.type_of())
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a serde_json::Value to a JavaScript value
pub(crate) fn json_to_js<'js>(
    ctx: &Ctx<'js>,
    json: &serde_json::Value,
) -> rquickjs::Result<JsValue<'js>> {
    match json {
        serde_json::Value::Null => Ok(JsValue::new_null(ctx.clone())),
        serde_json::Value::Bool(b) => Ok(JsValue::new_bool(ctx.clone(), *b)),
        serde_json::Value::Number(n) => {
            // QuickJS small ints are 32-bit, anything wider becomes a double
            match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Ok(JsValue::new_int(ctx.clone(), i)),
                None => Ok(JsValue::new_float(ctx.clone(), n.as_f64().unwrap_or(f64::NAN))),
            }
        }
        serde_json::Value::String(s) => s.as_str().into_js(ctx),
        serde_json::Value::Array(arr) => {
            let js_arr = Array::new(ctx.clone())?;
            for (i, item) in arr.iter().enumerate() {
                js_arr.set(i, json_to_js(ctx, item)?)?;
            }
            Ok(js_arr.into_value())
        }
        serde_json::Value::Object(obj) => {
            let js_obj = Object::new(ctx.clone())?;
            for (key, val) in obj {
                js_obj.set(key.as_str(), json_to_js(ctx, val)?)?;
            }
            Ok(js_obj.into_value())
        }
    }
}
