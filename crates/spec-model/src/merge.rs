//! Flexible overrides: YAML documents and dotted `key=value` phrases.
//!
//! User input is untyped, so every incoming leaf is validated and coerced
//! against the serialized default [`ShowSpec`] before it ever reaches the
//! typed structs. Unknown keys fail fast with the offending path; values
//! are coerced to the type of the default at the same path. The two open
//! maps (`recording.headers.*`, `banner.vars.*`) accept arbitrary keys.
//!
//! Array leaves accumulate: each phrase or document appends values, and
//! the typed merge later concatenates them onto the defaults.

use serde_json::{Map, Value};

use loadcast_common::{LoadcastError, LoadcastResult};

use crate::spec::{ShowOverrides, ShowSpec};

/// Key prefixes that bypass reference validation.
const FORCE_PREFIXES: &[&str] = &["recording.headers.", "banner.vars."];

/// Loose boolean parsing for user-supplied strings.
pub fn boolish(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
}

/// Split `input` on commas that sit outside single or double quotes.
///
/// Quotes group characters without appearing in the output, and a
/// backslash escapes the next character anywhere. The final chunk is
/// always emitted, so an empty input yields one empty string.
pub fn split_quoted_strings(input: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            c if Some(c) == quote => quote = None,
            '\'' | '"' if quote.is_none() => quote = Some(ch),
            ',' if quote.is_none() => {
                result.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    result.push(current);
    result
}

/// Split a `key=value` phrase at its first equals sign.
pub fn parse_override_phrase(phrase: &str) -> LoadcastResult<(&str, &str)> {
    phrase
        .split_once('=')
        .ok_or_else(|| LoadcastError::config(format!("Invalid override phrase: {phrase}")))
}

/// Accumulates user overrides as an untyped tree, validated leaf by leaf,
/// and finally folds them over the defaults.
#[derive(Debug, Clone)]
pub struct OverrideSet {
    tree: Value,
    reference: Value,
}

impl OverrideSet {
    pub fn new() -> LoadcastResult<Self> {
        Ok(Self {
            tree: Value::Object(Map::new()),
            reference: serde_json::to_value(ShowSpec::default())?,
        })
    }

    /// Merge a whole YAML document of overrides.
    pub fn apply_yaml(&mut self, yaml: &str) -> LoadcastResult<()> {
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let incoming = serde_json::to_value(parsed)?;
        if !incoming.is_object() {
            return Err(LoadcastError::config(
                "Override document must be a mapping",
            ));
        }
        self.merge_subtree(&incoming, String::new())
    }

    /// Apply a single `key=value` phrase.
    pub fn apply_phrase(&mut self, phrase: &str) -> LoadcastResult<()> {
        let (key, value) = parse_override_phrase(phrase)?;
        self.update(key, &Value::String(value.to_string()))
    }

    /// Deserialize the accumulated tree and fold it over the defaults.
    pub fn into_spec(self) -> LoadcastResult<ShowSpec> {
        let overrides: ShowOverrides = serde_json::from_value(self.tree)
            .map_err(|e| LoadcastError::config(format!("Invalid override values: {e}")))?;
        Ok(ShowSpec::default().merge(overrides))
    }

    fn merge_subtree(&mut self, incoming: &Value, prefix: String) -> LoadcastResult<()> {
        if let Value::Object(map) = incoming {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if value.is_object() {
                    self.merge_subtree(value, path)?;
                } else {
                    self.update(&path, value)?;
                }
            }
        }
        Ok(())
    }

    /// Validate one leaf against the reference tree and store it.
    fn update(&mut self, key_path: &str, value: &Value) -> LoadcastResult<()> {
        if FORCE_PREFIXES.iter().any(|p| key_path.starts_with(p)) {
            set_path(&mut self.tree, key_path, Value::String(stringify(value)));
            return Ok(());
        }

        let Some(reference) = lookup(&self.reference, key_path) else {
            return Err(LoadcastError::config(format!(
                "No such key {key_path} in show spec"
            )));
        };

        let coerced = match reference {
            Value::String(_) => Value::String(stringify(value)),
            Value::Bool(_) => Value::Bool(coerce_bool(value)),
            Value::Number(reference_number) => {
                coerce_number(key_path, value, reference_number.is_f64())?
            }
            Value::Array(_) => {
                let mut items = match lookup(&self.tree, key_path) {
                    Some(Value::Array(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                items.extend(coerce_string_list(value).into_iter().map(Value::String));
                Value::Array(items)
            }
            _ => {
                return Err(LoadcastError::config(format!(
                    "Cannot assign to {key_path}: it is a section, not a value"
                )));
            }
        };
        set_path(&mut self.tree, key_path, coerced);
        Ok(())
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) => true,
        Value::String(s) => boolish(s),
        _ => false,
    }
}

fn coerce_number(key_path: &str, value: &Value, float_reference: bool) -> LoadcastResult<Value> {
    let text = stringify(value);
    let invalid =
        || LoadcastError::config(format!("Invalid number value for {key_path}: {text}"));

    let parsed: f64 = text.trim().parse().map_err(|_| invalid())?;
    if !parsed.is_finite() {
        return Err(invalid());
    }
    if float_reference {
        return serde_json::Number::from_f64(parsed)
            .map(Value::Number)
            .ok_or_else(invalid);
    }
    if parsed.fract() != 0.0 {
        return Err(invalid());
    }
    Ok(Value::Number(serde_json::Number::from(parsed as i64)))
}

fn coerce_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(stringify).collect(),
        other => split_quoted_strings(&stringify(other))
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect(),
    }
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = tree;
    for part in path.split('.') {
        node = node.as_object()?.get(part)?;
    }
    Some(node)
}

fn set_path(tree: &mut Value, path: &str, value: Value) {
    if !tree.is_object() {
        *tree = Value::Object(Map::new());
    }
    let Value::Object(map) = tree else { return };

    match path.split_once('.') {
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        }
        None => {
            map.insert(path.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FrameFormat;

    #[test]
    fn test_boolish_accepted_spellings() {
        assert!(boolish("true"));
        assert!(boolish("TRUE"));
        assert!(boolish("Yes"));
        assert!(boolish("1"));
        assert!(!boolish("on"));
        assert!(!boolish("0"));
        assert!(!boolish("false"));
        assert!(!boolish(""));
    }

    #[test]
    fn test_split_plain_commas() {
        assert_eq!(split_quoted_strings("x,y,z"), ["x", "y", "z"]);
        assert_eq!(split_quoted_strings(""), [""]);
        assert_eq!(split_quoted_strings("a,"), ["a", ""]);
    }

    #[test]
    fn test_split_respects_quotes() {
        assert_eq!(split_quoted_strings("a,'b,c',d"), ["a", "b,c", "d"]);
        assert_eq!(split_quoted_strings("\"x,y\",z"), ["x,y", "z"]);
        // An unclosed quote runs to the end of the input.
        assert_eq!(split_quoted_strings("it's,fine"), ["its,fine"]);
    }

    #[test]
    fn test_split_backslash_escapes() {
        assert_eq!(split_quoted_strings("a\\,b,c"), ["a,b", "c"]);
        assert_eq!(split_quoted_strings("a\\\\,b"), ["a\\", "b"]);
    }

    #[test]
    fn test_parse_phrase_splits_at_first_equals() {
        assert_eq!(
            parse_override_phrase("a.b=c=d").unwrap(),
            ("a.b", "c=d")
        );
        assert!(parse_override_phrase("no-equals").is_err());
    }

    #[test]
    fn test_phrase_number_coercion() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_phrase("layout.canvasWidth=800").unwrap();
        set.apply_phrase("recording.network.latencyMs=35.5").unwrap();
        let spec = set.into_spec().unwrap();
        assert_eq!(spec.layout.canvas_width, 800);
        assert_eq!(spec.recording.network.latency_ms, 35.5);
    }

    #[test]
    fn test_phrase_bool_and_string_coercion() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_phrase("hasBanner=no").unwrap();
        set.apply_phrase("hasProgressBar=yes").unwrap();
        set.apply_phrase("frameFormat=jpeg").unwrap();
        set.apply_phrase("composition.colorTheme.background=#123456")
            .unwrap();
        let spec = set.into_spec().unwrap();
        assert!(!spec.has_banner);
        assert!(spec.has_progress_bar);
        assert_eq!(spec.frame_format, FrameFormat::Jpeg);
        assert_eq!(spec.composition.color_theme.background, "#123456");
    }

    #[test]
    fn test_phrase_array_appends_across_updates() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_phrase("rendering.ffmpegArgs=-c:v,libx264").unwrap();
        set.apply_phrase("rendering.ffmpegArgs='-crf', '30'").unwrap();
        let spec = set.into_spec().unwrap();
        assert_eq!(
            spec.rendering.ffmpeg_args,
            ["-c:v", "libx264", "-crf", "30"]
        );
    }

    #[test]
    fn test_phrase_unknown_key_is_error() {
        let mut set = OverrideSet::new().unwrap();
        let err = set.apply_phrase("layout.nope=1").unwrap_err();
        assert!(err.to_string().contains("layout.nope"));
    }

    #[test]
    fn test_phrase_invalid_number_is_error() {
        let mut set = OverrideSet::new().unwrap();
        let err = set.apply_phrase("layout.canvasWidth=abc").unwrap_err();
        assert!(err.to_string().contains("layout.canvasWidth"));
        assert!(err.to_string().contains("abc"));

        // Integer defaults reject fractional values.
        assert!(set.apply_phrase("layout.canvasWidth=1.5").is_err());
    }

    #[test]
    fn test_phrase_section_assignment_is_error() {
        let mut set = OverrideSet::new().unwrap();
        assert!(set.apply_phrase("layout=5").is_err());
    }

    #[test]
    fn test_forced_keys_bypass_validation() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_phrase("recording.headers.X-Api-Key=secret").unwrap();
        set.apply_phrase("banner.vars.extraLine=hello").unwrap();
        let spec = set.into_spec().unwrap();
        assert_eq!(spec.recording.headers["x-api-key"], "secret");
        assert_eq!(spec.banner.vars["extraLine"], "hello");
    }

    #[test]
    fn test_yaml_document_merge() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_yaml(
            "layout:\n  canvasWidth: 720\n  columns: 2\nrendering:\n  ffmpegArgs: ['-an']\nrecording:\n  headers:\n    X-Test: '1'\n",
        )
        .unwrap();
        let spec = set.into_spec().unwrap();
        assert_eq!(spec.layout.canvas_width, 720);
        assert_eq!(spec.layout.columns, 2);
        assert_eq!(spec.rendering.ffmpeg_args, ["-an"]);
        assert_eq!(spec.recording.headers["x-test"], "1");
    }

    #[test]
    fn test_yaml_unknown_key_is_error() {
        let mut set = OverrideSet::new().unwrap();
        let err = set.apply_yaml("layout:\n  bogus: 3\n").unwrap_err();
        assert!(err.to_string().contains("layout.bogus"));
    }

    #[test]
    fn test_yaml_scalar_document_is_error() {
        let mut set = OverrideSet::new().unwrap();
        assert!(set.apply_yaml("just a string").is_err());
    }

    #[test]
    fn test_yaml_then_phrase_layering() {
        let mut set = OverrideSet::new().unwrap();
        set.apply_yaml("layout:\n  canvasWidth: 720\n").unwrap();
        set.apply_phrase("layout.canvasWidth=800").unwrap();
        let spec = set.into_spec().unwrap();
        assert_eq!(spec.layout.canvas_width, 800);
    }

    #[test]
    fn test_empty_set_yields_defaults() {
        let spec = OverrideSet::new().unwrap().into_spec().unwrap();
        assert_eq!(spec, ShowSpec::default());
    }
}
