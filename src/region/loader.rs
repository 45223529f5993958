use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::{RegionDefinition, RegionSet};

/// Serialization of a region file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionFormat {
    /// The annotation tool's native output: a top-level list of records.
    Yaml,
    Json,
    /// TOML has no top-level arrays, so records live under `[[regions]]`.
    Toml,
}

impl RegionFormat {
    /// Picks the format from the file extension, defaulting to YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegionDocument {
    List(Vec<RegionDefinition>),
    Wrapped { regions: Vec<RegionDefinition> },
}

impl RegionDocument {
    fn into_definitions(self) -> Vec<RegionDefinition> {
        match self {
            Self::List(defs) | Self::Wrapped { regions: defs } => defs,
        }
    }
}

/// Parses region records from text. An empty document is an error (nothing
/// was annotated); an explicit empty list is a valid, empty lot.
pub fn parse_region_document(raw: &str, format: RegionFormat) -> Result<Vec<RegionDefinition>> {
    if raw.trim().is_empty() {
        return Err(anyhow!("no region definitions found"));
    }
    let doc: RegionDocument = match format {
        RegionFormat::Yaml => serde_yaml::from_str(raw).context("invalid YAML region document")?,
        RegionFormat::Json => serde_json::from_str(raw).context("invalid JSON region document")?,
        RegionFormat::Toml => toml::from_str(raw).context("invalid TOML region document")?,
    };
    Ok(doc.into_definitions())
}

/// Reads and validates a region file into a `RegionSet`.
pub fn load_region_file(path: &Path) -> Result<RegionSet> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read region file {}: {}", path.display(), e))?;
    let defs = parse_region_document(&raw, RegionFormat::from_path(path))
        .with_context(|| format!("region file {}", path.display()))?;
    let set = RegionSet::from_definitions(&defs)
        .with_context(|| format!("region file {}", path.display()))?;
    log::info!("loaded {} regions from {}", set.len(), path.display());
    Ok(set)
}
