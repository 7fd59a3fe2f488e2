// src/modules.rs

//! Path-prefix -> module map with deterministic colors.
//!
//! Entries stay in declared order in a flat arena; each keeps the index of
//! the earlier entry whose path is its parent directory, and a child's
//! color is a seeded jitter of its parent's.

use crate::error::{Error, Result};
use palette::{FromColor, Hsv, Srgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const UNKNOWN_MODULE: &str = "Unknown";
pub const UNKNOWN_COLOR: &str = "#000000";
pub const CURRENT_MODULE: &str = "Current";
pub const CURRENT_COLOR: &str = "#008000";

const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Deserialize)]
struct ModuleRow {
    path: String,
    module: String,
}

/// HSV with hue in turns (0..1)
#[derive(Debug, Clone, Copy, PartialEq)]
struct HsvColor {
    hue: f32,
    saturation: f32,
    value: f32,
}

impl HsvColor {
    fn top_level(index: usize) -> Self {
        Self {
            hue: (index as f32 * GOLDEN_RATIO_CONJUGATE).fract(),
            saturation: 0.5,
            value: 0.95,
        }
    }

    fn jittered(self, seed_name: &str) -> Self {
        let mut rng = StdRng::seed_from_u64(fnv1a(seed_name));
        Self {
            hue: (self.hue + rng.gen_range(-0.1f32..0.1f32)).rem_euclid(1.0),
            saturation: (self.saturation + rng.gen_range(-0.25f32..0.25f32)).clamp(0.4, 1.0),
            value: (self.value + rng.gen_range(-0.25f32..0.25f32)).clamp(0.7, 1.0),
        }
    }

    fn to_hex(self) -> String {
        let hsv: Hsv = Hsv::new(self.hue * 360.0, self.saturation, self.value);
        let rgb: Srgb<u8> = Srgb::from_color(hsv).into_format();
        let (r, g, b) = rgb.into_components();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// 64-bit FNV-1a over the name's bytes.
fn fnv1a(name: &str) -> u64 {
    name.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleColorEntry {
    pub path_prefix: String,
    pub module_name: String,
    pub color: String,
    /// Index of the parent entry in the same map
    pub parent: Option<usize>,
    hsv: HsvColor,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleColorMap {
    entries: Vec<ModuleColorEntry>,
}

impl ModuleColorMap {
    /// Builds the map from `(path, module)` pairs in declared order.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut entries: Vec<ModuleColorEntry> = Vec::new();
        let mut by_path: HashMap<String, usize> = HashMap::new();

        for (index, (path, module)) in rows.into_iter().enumerate() {
            let parent = path
                .rsplit_once('/')
                .and_then(|(parent_path, _)| by_path.get(parent_path).copied());
            let hsv = match parent {
                Some(p) => entries[p].hsv.jittered(&module),
                None => HsvColor::top_level(index),
            };
            by_path.insert(path.clone(), entries.len());
            entries.push(ModuleColorEntry {
                path_prefix: path,
                module_name: module,
                color: hsv.to_hex(),
                parent,
                hsv,
            });
        }
        Self { entries }
    }

    /// Loads a `path,module` CSV; every row must carry both fields.
    pub fn from_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "module map file {} not found",
                path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let rows = reader
            .deserialize::<ModuleRow>()
            .map(|row| row.map(|r| (r.path, r.module)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let map = Self::from_rows(rows);
        info!(modules = map.entries.len(), path = %path.display(), "loaded module map");
        Ok(map)
    }

    pub fn entries(&self) -> &[ModuleColorEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the longest `path_prefix` that prefixes `file`.
    /// Equal-length duplicates resolve to the first declared.
    pub fn attribute(&self, file: &str) -> Option<&ModuleColorEntry> {
        let mut best: Option<&ModuleColorEntry> = None;
        for entry in &self.entries {
            if !file.starts_with(entry.path_prefix.as_str()) {
                continue;
            }
            if best.map_or(true, |b| entry.path_prefix.len() > b.path_prefix.len()) {
                best = Some(entry);
            }
        }
        best
    }
}
