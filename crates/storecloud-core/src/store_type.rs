use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Backend families a storage driver can belong to.
///
/// Callers branch on this only when backend-specific behavior cannot be
/// hidden behind the driver interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Filesystem,
    Cmis,
    Azure,
    S3,
    Memory,
}

impl FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(StoreType::Filesystem),
            "cmis" => Ok(StoreType::Cmis),
            "azure" => Ok(StoreType::Azure),
            "s3" => Ok(StoreType::S3),
            "memory" => Ok(StoreType::Memory),
            _ => Err(anyhow::anyhow!("Invalid store type: {}", s)),
        }
    }
}

impl Display for StoreType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StoreType::Filesystem => write!(f, "filesystem"),
            StoreType::Cmis => write!(f, "cmis"),
            StoreType::Azure => write!(f, "azure"),
            StoreType::S3 => write!(f, "s3"),
            StoreType::Memory => write!(f, "memory"),
        }
    }
}
