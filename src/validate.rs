use crate::generator::GeneratorRegistry;
use tracing::info;

/// Backs the `check` subcommand: runs every non-scripted generator file
/// under root and logs how many targets each produced, then a grand
/// total. Grounded on `validate.py`.
pub async fn validate(root_dir: &std::path::Path) -> anyhow::Result<usize> {
    let registry = GeneratorRegistry::new(root_dir);
    let total = registry.validate().await?;
    info!(total, "generated targets in total");
    Ok(total)
}
