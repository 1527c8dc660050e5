// SPDX-License-Identifier: GPL-3.0-only
use url::Url;
use anyhow::{Result, Context};

/// Maximum allowed URL length
const MAX_URL_LENGTH: usize = 2048;

/// Validate the configured source API base URL
///
/// Checks:
/// - Only allows http/https schemes
/// - Requires a host
/// - Rejects embedded credentials (use `source_api_key` instead)
/// - Rejects query strings and fragments, which the source adapter owns
/// - Validates URL length
pub fn validate_source_url(url_str: &str) -> Result<Url> {
    if url_str.len() > MAX_URL_LENGTH {
        return Err(anyhow::anyhow!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }

    let url = Url::parse(url_str)
        .context("Invalid source URL format")?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(anyhow::anyhow!(
                "Invalid URL scheme: {} (only http and https are allowed)",
                scheme
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow::anyhow!("URL must have a host"));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(anyhow::anyhow!(
            "URL must not embed credentials; configure source_api_key instead"
        ));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(anyhow::anyhow!("URL must not contain a query string or fragment"));
    }

    Ok(url)
}
