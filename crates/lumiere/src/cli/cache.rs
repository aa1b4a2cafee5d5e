//! Cache maintenance commands.

use super::OutputFormat;
use lumiere::{Fingerprint, LumiereConfig, ResultCache};
use std::error::Error;

/// Remove one cache entry by fingerprint.
///
/// Purging is the only way to force a fingerprint to be regenerated.
pub async fn purge_fingerprint(
    config: &LumiereConfig,
    fingerprint: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let fingerprint = Fingerprint::from_hex(fingerprint)
        .ok_or_else(|| format!("'{}' is not a valid fingerprint", fingerprint))?;
    let cache = ResultCache::new(config.cache().clone());
    let removed = cache.purge(&fingerprint).await;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "fingerprint": fingerprint.to_string(), "removed": removed })
        ),
        OutputFormat::Human if removed => println!("Purged {}", fingerprint),
        OutputFormat::Human => println!("No entry for {}", fingerprint),
    }
    Ok(())
}
