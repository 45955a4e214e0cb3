use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::Record;

/// Per-item binding for handlers running inside a collection template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScope {
    /// Placeholder prefix, `item` in `{{item.title}}`.
    pub name: String,
    pub item: Json,
}

impl ItemScope {
    pub fn new(name: impl Into<String>, item: Json) -> Self {
        Self {
            name: name.into(),
            item,
        }
    }

    /// Resolves a dotted path such as `item.tags.0`.
    fn lookup(&self, path: &str) -> Option<&Json> {
        let mut segments = path.split('.').map(str::trim);
        if segments.next()? != self.name {
            return None;
        }
        segments.try_fold(&self.item, |value, segment| match value {
            Json::Object(map) => map.get(segment),
            Json::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
    }

    /// Replaces every resolvable `{{path}}` in `input`. Unresolved
    /// placeholders stay as written.
    pub fn resolve_str(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            let close = open + 2 + close;
            out.push_str(&rest[..open]);
            match self.lookup(&rest[open + 2..close]) {
                Some(Json::String(text)) => out.push_str(text),
                Some(value) => out.push_str(&value.to_string()),
                None => out.push_str(&rest[open..close + 2]),
            }
            rest = &rest[close + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Resolves placeholders inside a JSON value. A string that is exactly one
    /// placeholder takes the raw item value, keeping numbers and booleans.
    pub fn resolve_json(&self, value: &Json) -> Json {
        match value {
            Json::String(text) => {
                if let Some(resolved) = self.whole_placeholder(text) {
                    return resolved.clone();
                }
                Json::String(self.resolve_str(text))
            }
            Json::Array(items) => Json::Array(items.iter().map(|v| self.resolve_json(v)).collect()),
            Json::Object(map) => Json::Object(self.resolve_record(map)),
            other => other.clone(),
        }
    }

    pub fn resolve_record(&self, record: &Record) -> Record {
        record
            .iter()
            .map(|(key, value)| (key.clone(), self.resolve_json(value)))
            .collect()
    }

    fn whole_placeholder(&self, text: &str) -> Option<&Json> {
        let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?;
        if inner.contains("{{") || inner.contains("}}") {
            return None;
        }
        self.lookup(inner)
    }
}
