//! Pull the script out of a model response

use regex::Regex;
use std::sync::OnceLock;

fn script_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<script>(.*?)</script>").unwrap())
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap())
}

/// The script in a `<script>` block, else the first fenced code block
pub fn extract_script(text: &str) -> Option<String> {
    let captured = script_tag()
        .captures(text)
        .or_else(|| fenced_block().captures(text))?;
    let script = captured.get(1)?.as_str().trim();
    if script.is_empty() {
        None
    } else {
        Some(script.to_string())
    }
}
