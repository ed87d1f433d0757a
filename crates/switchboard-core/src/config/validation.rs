//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    let expected = expected_bus_config_keys();
    for path in find_unknown_keys(&value, &expected, "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Paths like "function.timeoutMsx" for every key not in `expected`.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let Value::Object(obj) = value else {
        return Vec::new();
    };

    let mut unknowns = Vec::new();
    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }
    unknowns
}

/// Leaf `fields` and `nested` sections of one config level.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_bus_config_keys() -> ExpectedKeys {
    ExpectedKeys::new(&[])
        .with_nested("queue", ExpectedKeys::new(&["capacity"]))
        .with_nested("routing", ExpectedKeys::new(&["tableCapacity"]))
        .with_nested(
            "function",
            ExpectedKeys::new(&["pollIntervalMs", "timeoutMs"]),
        )
        .with_nested("driver", ExpectedKeys::new(&["pollIntervalMs"]))
}
