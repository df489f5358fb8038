//! Runtime config generation
//!
//! Renders an on-disk JSON template for the endpoint's protocol family and
//! writes the result to the output directory. Output files are keyed by
//! family, server and a hash of the full link so that two endpoints sharing
//! a server never overwrite each other.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CheckerError, Result};
use crate::link::{ParsedEndpoint, ProtocolFamily};

/// Generates runtime proxy configurations from templates
pub struct ConfigGenerator {
    template_dir: PathBuf,
    output_dir: PathBuf,
}

impl ConfigGenerator {
    pub fn new<P: Into<PathBuf>>(template_dir: P, output_dir: P) -> Self {
        Self {
            template_dir: template_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Render the template for the endpoint's family and persist the result.
    ///
    /// Overwrites an existing file of the same name. Returns the output path.
    pub fn generate(&self, endpoint: &ParsedEndpoint) -> Result<PathBuf> {
        let template_path = self
            .template_dir
            .join(format!("{}.json.tmpl", endpoint.protocol));

        let raw = fs::read_to_string(&template_path).map_err(|e| {
            CheckerError::Template(format!(
                "cannot read template {}: {}",
                template_path.display(),
                e
            ))
        })?;
        let template: Value = serde_json::from_str(&raw).map_err(|e| {
            CheckerError::Template(format!(
                "template {} is not valid JSON: {}",
                template_path.display(),
                e
            ))
        })?;

        let fields = endpoint_fields(endpoint);
        let required = required_fields(endpoint.protocol);
        let rendered = render_value(&template, &fields, required)?;

        let output_path = self.output_dir.join(output_file_name(endpoint));
        let document = serde_json::to_string_pretty(&rendered)?;
        fs::write(&output_path, document)?;

        debug!(config = %output_path.display(), "runtime config written");
        Ok(output_path)
    }
}

/// Collision-free output file name: `<family>-<server>-<hash8>.json`
/// where `hash8` is the leading 8 hex chars of SHA-256 over the full link.
pub fn output_file_name(endpoint: &ParsedEndpoint) -> String {
    let digest = Sha256::digest(endpoint.link.as_bytes());
    let hash8: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}-{}.json", endpoint.protocol, endpoint.server, hash8)
}

/// All placeholder values exposed to templates
fn endpoint_fields(endpoint: &ParsedEndpoint) -> HashMap<&'static str, String> {
    let mut fields = HashMap::new();
    fields.insert("protocol", endpoint.protocol.to_string());
    fields.insert("user_id", endpoint.user_id.clone());
    fields.insert("server", endpoint.server.clone());
    fields.insert("port", endpoint.port.to_string());
    fields.insert("security", endpoint.security.clone());
    fields.insert("transport", endpoint.transport_type.clone());
    fields.insert("header_type", endpoint.header_type.clone());
    fields.insert("flow", endpoint.flow.clone());
    fields.insert("path", endpoint.path.clone());
    fields.insert("host", endpoint.host.clone());
    fields.insert("sni", endpoint.sni.clone());
    fields.insert("fingerprint", endpoint.fingerprint.clone());
    fields.insert("public_key", endpoint.public_key.clone());
    fields.insert("short_id", endpoint.short_id.clone());
    fields.insert("name", endpoint.display_name.clone());
    fields.insert("method", endpoint.cipher_method.clone());
    fields.insert("local_port", endpoint.allocated_local_port.to_string());
    fields.insert("monitor_link", endpoint.monitor_link.clone());
    fields
}

/// Fields a template may not render empty for the given family
fn required_fields(family: ProtocolFamily) -> &'static [&'static str] {
    match family {
        ProtocolFamily::Vless | ProtocolFamily::Trojan => {
            &["user_id", "server", "port", "local_port", "monitor_link"]
        }
        ProtocolFamily::Shadowsocks => &[
            "user_id",
            "server",
            "port",
            "local_port",
            "monitor_link",
            "method",
        ],
    }
}

/// Recursively substitute `{{field}}` placeholders in every string value.
fn render_value(
    value: &Value,
    fields: &HashMap<&'static str, String>,
    required: &[&str],
) -> Result<Value> {
    match value {
        Value::String(s) => render_string(s, fields, required),
        Value::Array(items) => {
            let rendered: Result<Vec<Value>> = items
                .iter()
                .map(|item| render_value(item, fields, required))
                .collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(key.clone(), render_value(item, fields, required)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

/// Fields rendered as JSON numbers when they stand alone in a string.
/// Credentials stay strings even when they happen to be all digits.
const NUMERIC_FIELDS: &[&str] = &["port", "local_port"];

/// Substitute placeholders in one string.
///
/// A string consisting of exactly one port placeholder renders as a JSON
/// number, so templates can write ports as "{{local_port}}".
fn render_string(
    template: &str,
    fields: &HashMap<&'static str, String>,
    required: &[&str],
) -> Result<Value> {
    let lookup = |name: &str| -> Result<String> {
        let value = fields
            .get(name)
            .ok_or_else(|| CheckerError::Render(format!("unknown placeholder: {}", name)))?;
        if value.is_empty() && required.contains(&name) {
            return Err(CheckerError::Render(format!(
                "required field is empty: {}",
                name
            )));
        }
        Ok(value.clone())
    };

    // Whole-token port fields get numeric coercion.
    if let Some(name) = whole_placeholder(template) {
        let value = lookup(name)?;
        if NUMERIC_FIELDS.contains(&name) {
            if let Ok(n) = value.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        return Ok(Value::String(value));
    }

    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| CheckerError::Render("unterminated placeholder".to_string()))?;
        let name = after[..end].trim();
        result.push_str(&lookup(name)?);
        rest = &after[end + 2..];
    }
    result.push_str(rest);
    Ok(Value::String(result))
}

/// If the string is exactly one `{{name}}` token, return the name.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    let inner = inner.trim();
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}
