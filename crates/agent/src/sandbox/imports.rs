//! Host modules a script may import

use regex::Regex;
use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Array, Dynamic, EvalAltResult, ImmutableString, Module, FLOAT, INT};
use std::collections::HashSet;
use std::sync::OnceLock;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Every module name a script may import
pub const ALLOWED_MODULES: &[&str] = &["json", "math", "text", "time"];

fn identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Allowed module names that appear as a token in `script`
pub fn referenced_modules(script: &str) -> Vec<&'static str> {
    let tokens: HashSet<&str> = identifier().find_iter(script).map(|m| m.as_str()).collect();
    ALLOWED_MODULES
        .iter()
        .copied()
        .filter(|name| tokens.contains(name))
        .collect()
}

/// Resolver exposing only the modules `script` refers to
pub fn resolver_for(script: &str) -> StaticModuleResolver {
    let mut resolver = StaticModuleResolver::new();
    for name in referenced_modules(script) {
        let module = match name {
            "json" => json_module(),
            "math" => math_module(),
            "text" => text_module(),
            "time" => time_module(),
            _ => continue,
        };
        resolver.insert(name, module);
    }
    resolver
}

fn json_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("parse", |text: ImmutableString| -> FnResult<Dynamic> {
        let value: serde_json::Value =
            serde_json::from_str(text.as_str()).map_err(|e| format!("json::parse: {}", e))?;
        rhai::serde::to_dynamic(value)
    });
    module.set_native_fn("stringify", |value: Dynamic| -> FnResult<String> {
        let value: serde_json::Value = rhai::serde::from_dynamic(&value)?;
        Ok(value.to_string())
    });
    module.set_native_fn("pretty", |value: Dynamic| -> FnResult<String> {
        let value: serde_json::Value = rhai::serde::from_dynamic(&value)?;
        serde_json::to_string_pretty(&value).map_err(|e| e.to_string().into())
    });
    module
}

fn math_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("abs", |x: INT| -> FnResult<INT> { Ok(x.abs()) });
    module.set_native_fn("abs", |x: FLOAT| -> FnResult<FLOAT> { Ok(x.abs()) });
    module.set_native_fn("min", |a: INT, b: INT| -> FnResult<INT> { Ok(a.min(b)) });
    module.set_native_fn("min", |a: FLOAT, b: FLOAT| -> FnResult<FLOAT> { Ok(a.min(b)) });
    module.set_native_fn("max", |a: INT, b: INT| -> FnResult<INT> { Ok(a.max(b)) });
    module.set_native_fn("max", |a: FLOAT, b: FLOAT| -> FnResult<FLOAT> { Ok(a.max(b)) });
    module.set_native_fn("floor", |x: FLOAT| -> FnResult<FLOAT> { Ok(x.floor()) });
    module.set_native_fn("ceil", |x: FLOAT| -> FnResult<FLOAT> { Ok(x.ceil()) });
    module.set_native_fn("round", |x: FLOAT| -> FnResult<FLOAT> { Ok(x.round()) });
    module.set_native_fn("sqrt", |x: FLOAT| -> FnResult<FLOAT> { Ok(x.sqrt()) });
    module.set_native_fn("pow", |x: FLOAT, y: FLOAT| -> FnResult<FLOAT> { Ok(x.powf(y)) });
    module.set_native_fn("to_float", |x: INT| -> FnResult<FLOAT> { Ok(x as FLOAT) });
    module.set_native_fn("pi", || -> FnResult<FLOAT> { Ok(std::f64::consts::PI as FLOAT) });
    module
}

fn text_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("upper", |s: ImmutableString| -> FnResult<String> {
        Ok(s.to_uppercase())
    });
    module.set_native_fn("lower", |s: ImmutableString| -> FnResult<String> {
        Ok(s.to_lowercase())
    });
    module.set_native_fn("trim", |s: ImmutableString| -> FnResult<String> {
        Ok(s.trim().to_string())
    });
    module.set_native_fn(
        "contains",
        |s: ImmutableString, needle: ImmutableString| -> FnResult<bool> {
            Ok(s.contains(needle.as_str()))
        },
    );
    module.set_native_fn(
        "replace",
        |s: ImmutableString, from: ImmutableString, to: ImmutableString| -> FnResult<String> {
            Ok(s.replace(from.as_str(), to.as_str()))
        },
    );
    module.set_native_fn(
        "split",
        |s: ImmutableString, sep: ImmutableString| -> FnResult<Array> {
            Ok(s.split(sep.as_str()).map(|p| Dynamic::from(p.to_string())).collect())
        },
    );
    module.set_native_fn("join", |parts: Array, sep: ImmutableString| -> FnResult<String> {
        let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
        Ok(parts.join(sep.as_str()))
    });
    module.set_native_fn("len", |s: ImmutableString| -> FnResult<INT> {
        Ok(s.chars().count() as INT)
    });
    module
}

fn time_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("now", || -> FnResult<String> { Ok(chrono::Utc::now().to_rfc3339()) });
    module.set_native_fn("unix", || -> FnResult<INT> { Ok(chrono::Utc::now().timestamp()) });
    module.set_native_fn("unix_millis", || -> FnResult<INT> {
        Ok(chrono::Utc::now().timestamp_millis())
    });
    module
}
