// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{KeywordEntry, KeywordTable};

pub const ENV_KEYWORDS_PATH: &str = "CRYPTO_KEYWORDS_PATH";

/// Load a keyword table from an explicit path. Supports TOML or JSON formats.
///
/// TOML:
/// ```toml
/// [[crypto]]
/// crypto = "bitcoin"
/// keywords = ["bitcoin", "btc"]
/// ```
/// JSON: `[{"crypto": "bitcoin", "keywords": ["bitcoin", "btc"]}]`
pub fn load_keywords_from(path: &Path) -> Result<KeywordTable> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keyword table from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let table = parse_keywords(&content, ext.as_str())?;
    if table.is_empty() {
        return Err(anyhow!("keyword table {} has no usable entries", path.display()));
    }
    Ok(table)
}

/// Load the keyword table using env var + fallbacks:
/// 1) $CRYPTO_KEYWORDS_PATH
/// 2) config/crypto_keywords.toml
/// 3) config/crypto_keywords.json
/// 4) built-in table
pub fn load_keywords_default() -> Result<KeywordTable> {
    if let Ok(p) = std::env::var(ENV_KEYWORDS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_keywords_from(&pb);
        } else {
            return Err(anyhow!("CRYPTO_KEYWORDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/crypto_keywords.toml");
    if toml_p.exists() {
        return load_keywords_from(&toml_p);
    }
    let json_p = PathBuf::from("config/crypto_keywords.json");
    if json_p.exists() {
        return load_keywords_from(&json_p);
    }
    Ok(KeywordTable::builtin())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<KeywordTable> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[crypto]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keyword table format"))
}

fn parse_toml(s: &str) -> Result<KeywordTable> {
    #[derive(serde::Deserialize)]
    struct TomlTable {
        crypto: Vec<KeywordEntry>,
    }
    let v: TomlTable = toml::from_str(s)?;
    Ok(KeywordTable::from_entries(v.crypto))
}

fn parse_json(s: &str) -> Result<KeywordTable> {
    let v: Vec<KeywordEntry> = serde_json::from_str(s)?;
    Ok(KeywordTable::from_entries(v))
}
