//! `facegate setup`: mirrors the face models into the local model directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use facegate_models::{
    default_model_dir, default_sources, ensure_models_ready, verify_model, HttpFetcher,
    ModelBundle, ModelLoader, MODELS,
};

async fn load(model_dir: Option<PathBuf>) -> Result<(PathBuf, Arc<ModelBundle>)> {
    match model_dir {
        Some(dir) => {
            let loader = ModelLoader::new(default_sources(dir.clone()), Arc::new(HttpFetcher));
            let bundle = loader.bundle().await?;
            Ok((dir, bundle))
        }
        None => {
            if !ensure_models_ready().await {
                bail!("could not load face models from any source");
            }
            let bundle = ModelLoader::global().bundle().await?;
            Ok((default_model_dir(), bundle))
        }
    }
}

/// Run the setup command: fetch the models from the first working source
/// and store them locally.
pub async fn run(model_dir: Option<PathBuf>) -> Result<()> {
    let (dir, bundle) = load(model_dir).await?;

    println!("Model directory: {}", dir.display());
    for failure in &bundle.failed_sources {
        println!("  {} unavailable: {}", failure.source, failure.error);
    }

    if bundle.source_index == 0 {
        println!("  loaded from local directory");
    } else {
        println!("  fetched from {}", bundle.source);
        bundle
            .write_to(&dir)
            .with_context(|| format!("failed to write models to {}", dir.display()))?;
    }

    for model in MODELS {
        let Some(loaded) = bundle.model(model.kind) else {
            bail!("bundle is missing {}", model.name);
        };
        verify_model(model, &dir, &loaded.sha256)?;
        println!(
            "  {} ({}, {} shard(s)) sha256 {} ok",
            model.name,
            model.size_display,
            loaded.shards.len(),
            loaded.sha256
        );
    }

    println!();
    if bundle.source_index == 0 {
        println!("All models already present. Nothing to download.");
    } else {
        println!("Setup complete: {} model(s) written.", bundle.models.len());
    }

    Ok(())
}
