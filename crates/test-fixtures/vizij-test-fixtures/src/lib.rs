//! Shared motion fixtures for tests and benches.
//!
//! Everything is resolved through `fixtures/manifest.json` at the workspace
//! root. Loaders are generic so this crate does not depend on the core crate.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    clips: HashMap<String, String>,
    skeletons: HashMap<String, String>,
    #[serde(rename = "param-specs")]
    param_specs: HashMap<String, String>,
    spaces: HashMap<String, SpaceEntry>,
}

/// A named group of clips meant to be built into one space.
#[derive(Debug, Clone, Deserialize)]
pub struct SpaceEntry {
    pub clips: Vec<String>,
    pub skeleton: String,
    #[serde(default)]
    pub params: Option<String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        super::load_json(rel)
    }
}

pub mod skeletons {
    use super::*;

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.skeletons, "skeleton", name)?;
        super::load_json(rel)
    }
}

pub mod param_specs {
    use super::*;

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.param_specs, "param spec", name)?;
        super::load_json(rel)
    }
}

pub mod spaces {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.spaces.keys().cloned().collect()
    }

    pub fn entry(name: &str) -> Result<SpaceEntry> {
        lookup(&MANIFEST.spaces, "space", name).cloned()
    }

    /// Every clip of the space, deserialized in manifest order.
    pub fn clips<T: DeserializeOwned>(name: &str) -> Result<Vec<T>> {
        entry(name)?
            .clips
            .iter()
            .map(|clip| super::clips::load(clip))
            .collect()
    }
}
