//! Style exporter converting CartoCSS into a renderer-neutral JSON document.
//!
//! The output is a flat list of rules. Nested blocks are flattened into their
//! parent's selector, so `#parks { [zoom>10] { line-width: 2; } }` becomes a
//! rule with selector `#parks[zoom>10]`.

use serde::Serialize;
use serde_json::{Map, Value, json};

/// Selector used for declarations that appear outside any block.
pub const GLOBAL_SELECTOR: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Map<String, Value>,
}

/// Exporter for sub-layer style documents.
pub struct StyleExporter;

impl StyleExporter {
    /// Convert a sub-layer's CartoCSS into a style document.
    pub fn export(cartocss: &str, version: Option<&str>) -> Value {
        let (variables, rules) = Self::parse(cartocss);

        let mut document = Map::new();
        document.insert("version".to_string(), json!(version));
        if !variables.is_empty() {
            document.insert("variables".to_string(), json!(variables));
        }
        document.insert("rules".to_string(), json!(rules));
        json!(document)
    }

    /// Split CartoCSS into `@variable` definitions and flattened rules.
    pub fn parse(cartocss: &str) -> (Map<String, Value>, Vec<StyleRule>) {
        let source = strip_comments(cartocss);
        let mut variables = Map::new();
        let mut rules: Vec<StyleRule> = Vec::new();
        let mut selectors: Vec<String> = Vec::new();
        let mut buffer = String::new();
        let mut quote: Option<char> = None;
        let mut paren_depth = 0usize;

        for ch in source.chars() {
            if let Some(q) = quote {
                buffer.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }

            match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    buffer.push(ch);
                }
                '(' => {
                    paren_depth += 1;
                    buffer.push(ch);
                }
                ')' => {
                    paren_depth = paren_depth.saturating_sub(1);
                    buffer.push(ch);
                }
                '{' if paren_depth == 0 => {
                    let selector = join_selector(selectors.last(), buffer.trim());
                    selectors.push(selector);
                    buffer.clear();
                }
                ';' if paren_depth == 0 => {
                    Self::declare(&buffer, selectors.last(), &mut variables, &mut rules);
                    buffer.clear();
                }
                '}' if paren_depth == 0 => {
                    Self::declare(&buffer, selectors.last(), &mut variables, &mut rules);
                    buffer.clear();
                    selectors.pop();
                }
                _ => buffer.push(ch),
            }
        }
        Self::declare(&buffer, selectors.last(), &mut variables, &mut rules);

        (variables, rules)
    }

    fn declare(
        raw: &str,
        selector: Option<&String>,
        variables: &mut Map<String, Value>,
        rules: &mut Vec<StyleRule>,
    ) {
        let Some((property, value)) = raw.split_once(':') else {
            return;
        };
        let property = property.trim();
        let value = value.trim();
        if property.is_empty() || value.is_empty() {
            return;
        }

        let value = variables
            .get(value)
            .cloned()
            .unwrap_or_else(|| Self::convert_value(value));

        if selector.is_none() && property.starts_with('@') {
            variables.insert(property.to_string(), value);
            return;
        }

        let selector = selector.map(String::as_str).unwrap_or(GLOBAL_SELECTOR);
        let index = match rules.iter().position(|r| r.selector == selector) {
            Some(index) => index,
            None => {
                rules.push(StyleRule {
                    selector: selector.to_string(),
                    declarations: Map::new(),
                });
                rules.len() - 1
            }
        };
        rules[index]
            .declarations
            .insert(property.to_string(), value);
    }

    /// Numbers and booleans become JSON scalars, everything else stays a string.
    fn convert_value(value: &str) -> Value {
        if let Ok(int) = value.parse::<i64>() {
            return json!(int);
        }
        if let Ok(float) = value.parse::<f64>() {
            if float.is_finite() {
                return json!(float);
            }
        }
        match value {
            "true" => json!(true),
            "false" => json!(false),
            _ => json!(value),
        }
    }
}

fn join_selector(parent: Option<&String>, child: &str) -> String {
    match parent {
        None => child.to_string(),
        Some(parent) if child.is_empty() => parent.clone(),
        Some(parent) if child.starts_with('[') || child.starts_with("::") => {
            format!("{}{}", parent, child)
        }
        Some(parent) => format!("{} {}", parent, child),
    }
}

/// Remove `/* */` and `//` comments outside of strings and `url(...)`.
fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<char> = None;
    let mut paren_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (ch, next) {
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            ('/', Some('/')) if paren_depth == 0 => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ('"', _) | ('\'', _) => quote = Some(ch),
            ('(', _) => paren_depth += 1,
            (')', _) => paren_depth = paren_depth.saturating_sub(1),
            _ => {}
        }
        out.push(ch);
        i += 1;
    }
    out
}
