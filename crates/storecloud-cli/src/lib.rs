use storecloud_core::{PropertyValue, StorageObject};
use storecloud_services::StoreService;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a `name=value` pair from the command line.
///
/// Integers and booleans become typed values; everything else is a string.
pub fn parse_property(raw: &str) -> anyhow::Result<(String, PropertyValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected name=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Property name must not be empty in '{}'", raw);
    }
    let value = if let Ok(i) = value.parse::<i64>() {
        PropertyValue::Integer(i)
    } else if let Ok(b) = value.parse::<bool>() {
        PropertyValue::Boolean(b)
    } else {
        PropertyValue::String(value.to_string())
    };
    Ok((name.to_string(), value))
}

/// One line of `ls` output: kind, size, path.
pub fn format_listing_row(object: &StorageObject, width: usize) -> String {
    let kind = if object.is_folder() { "d" } else { "-" };
    let size = object
        .content_length()
        .map(|len| len.to_string())
        .unwrap_or_default();
    format!("{} {:>10} {}", kind, size, truncate_string(object.path(), width))
}

/// Key of the folder to list: the given key, or the repository root's key.
pub async fn listing_key(svc: &StoreService, key: Option<String>) -> anyhow::Result<String> {
    if let Some(key) = key {
        return Ok(key);
    }
    svc.get_storage_object_by_path("/")
        .await?
        .map(|root| root.key().to_string())
        .ok_or_else(|| anyhow::anyhow!("Repository root does not resolve"))
}

/// Initialize tracing for the CLI binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
