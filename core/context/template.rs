use super::{ContextError, Value};
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Interpolate `{name}` placeholders in `template` with the values returned by `resolve`.
///
/// `{{` and `}}` render as literal braces.
///
pub fn render<F>(template: &str, resolve: F) -> Result<String, ContextError>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        match (whole.as_str(), caps.get(1)) {
            ("{{", _) => out.push('{'),
            ("}}", _) => out.push('}'),
            (_, Some(name)) => {
                let value = resolve(name.as_str())
                    .ok_or_else(|| ContextError::UnknownOption(name.as_str().to_string()))?;
                out.push_str(&value.to_string());
            }
            (other, None) => out.push_str(other),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}
