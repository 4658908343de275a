//! `facegate compare`: offline match of two stored descriptors.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use facegate_core::{Descriptor, EuclideanMatcher};

pub fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Descriptor::decode(text.trim())
        .with_context(|| format!("invalid face descriptor in {}", path.display()))
}

pub fn run(stored: &Path, candidate: &Path, threshold: f32) -> Result<bool> {
    let stored = read_descriptor(stored)?;
    let candidate = read_descriptor(candidate)?;

    let result = EuclideanMatcher::new(threshold).compare(&stored, &candidate);
    if let Some(distance) = result.distance {
        println!("distance:  {distance:.4}");
    }
    println!("threshold: {threshold}");
    println!("match:     {}", if result.matched { "yes" } else { "no" });
    Ok(result.matched)
}
