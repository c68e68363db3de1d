//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use flowkit::core::coerce::{self, TypeTag};
use flowkit::core::shape::Shape;
use flowkit::core::{hash, id, record};
use flowkit::flow::contract::Contract;
use flowkit::io::config::{ToolkitConfig, load_config};
use flowkit::io::discover::{self, FindOptions, Pattern};
use flowkit::Pipeline;
use serde_json::Value;
use tracing::debug;

use crate::{CaseStyle, HashAlgorithm};

const CONFIG_NAME: &str = "flowkit.toml";
const CONFIG_SEARCH: [&str; 2] = [".", "$HOME/.config/flowkit"];

/// Load `explicit`, or the first `flowkit.toml` on the search path, or defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<ToolkitConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let search: Vec<String> = CONFIG_SEARCH.iter().map(|dir| dir.to_string()).collect();
    let options = FindOptions {
        max: 1,
        ..FindOptions::default()
    };
    match discover::find(&search, &Pattern::Name(CONFIG_NAME.to_string()), &options).first() {
        Some(path) => load_config(path),
        None => Ok(ToolkitConfig::default()),
    }
}

pub fn hash(algorithm: HashAlgorithm, parts: &[String], base64: bool) -> Result<()> {
    println!("{}", digest(algorithm, parts, base64)?);
    Ok(())
}

fn digest(algorithm: HashAlgorithm, parts: &[String], base64: bool) -> Result<String> {
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    let encoded = match (algorithm, base64) {
        (HashAlgorithm::Md5, false) => hash::md5(&parts),
        (HashAlgorithm::Md5, true) => hash::base64::md5(&parts),
        (HashAlgorithm::Sha1, false) => hash::sha1(&parts),
        (HashAlgorithm::Sha1, true) => hash::base64::sha1(&parts),
        (HashAlgorithm::Sha256, false) => hash::sha256(&parts),
        (HashAlgorithm::Sha256, true) => hash::base64::sha256(&parts),
        (HashAlgorithm::Sha512, false) => hash::sha512(&parts),
        (HashAlgorithm::Sha512, true) => hash::base64::sha512(&parts),
        (HashAlgorithm::Short, false) => hash::short(&parts.concat()),
        (HashAlgorithm::Short, true) => bail!("short hashes are always hex"),
    };
    Ok(encoded)
}

pub fn case(style: CaseStyle, identifier: &str, nonstrict: bool) -> Result<()> {
    println!("{}", convert_case(style, identifier, nonstrict)?);
    Ok(())
}

fn convert_case(style: CaseStyle, identifier: &str, nonstrict: bool) -> Result<String> {
    let converted = match style {
        CaseStyle::Camel => id::to_camel_case(identifier, nonstrict)?,
        CaseStyle::Dash => id::to_dash_case(identifier, nonstrict)?,
        CaseStyle::Underscore => id::to_underscore_case(identifier, nonstrict)?,
        CaseStyle::Slug => id::slugify(identifier),
    };
    Ok(converted)
}

pub fn get(file: &Path, path: &str) -> Result<()> {
    let loaded = Value::Object(discover::load_record(file)?);
    let value = record::get(&loaded, path)
        .with_context(|| format!("{path} not found in {}", file.display()))?;
    println!("{}", render(value)?);
    Ok(())
}

fn render(value: &Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => serde_json::to_string_pretty(other).context("serialize value"),
    }
}

pub fn find(pattern: &str, paths: &[String], regex: bool, max: usize, all: bool) -> Result<()> {
    let pattern = if regex {
        Pattern::Regex(
            regex::Regex::new(pattern).with_context(|| format!("invalid regex {pattern:?}"))?,
        )
    } else {
        Pattern::Name(pattern.to_string())
    };
    let options = FindOptions {
        max,
        dotfiles: all,
        ..FindOptions::default()
    };
    let found = discover::find(paths, &pattern, &options);
    debug!(count = found.len(), "find finished");
    for path in found {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn coerce(raw: &str, to: &[TypeTag]) -> Result<()> {
    let coerced = coerce_raw(raw, to)?;
    println!("{coerced}");
    Ok(())
}

/// Parse `raw` as JSON, falling back to a plain string, then coerce it.
fn coerce_raw(raw: &str, to: &[TypeTag]) -> Result<Value> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let tags: Vec<String> = to.iter().map(ToString::to_string).collect();
    coerce::coerce(&value, to)
        .ok_or_else(|| anyhow!("cannot coerce {value} to any of [{}]", tags.join(", ")))
}

pub async fn check(file: &Path, shape_path: &Path, required: bool) -> Result<()> {
    let loaded = discover::load_record(file)?;
    let shape = Shape::from_json(&discover::load_json(shape_path)?)
        .with_context(|| format!("parse shape {}", shape_path.display()))?;
    if shape.is_empty() {
        bail!("shape {} declares no keys", shape_path.display());
    }

    let builder = Contract::builder(format!("check {}", file.display()));
    let contract = if required {
        builder.required(shape)
    } else {
        builder.accepts(shape)
    };
    Pipeline::make(loaded)
        .validate(Arc::new(contract.build()))
        .run()
        .await?;
    println!("ok: {}", file.display());
    Ok(())
}
