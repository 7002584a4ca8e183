use serde::{Deserialize, Serialize};

use crate::models::ImageContentType;

const DEFAULT_FILENAME: &str = "file";

/// Binary data associated with an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsergridAsset {
    pub filename: String,
    pub content_type: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Where the data was read from, if it came from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_location: Option<String>,
}

impl UsergridAsset {
    pub fn new(
        filename: Option<String>,
        data: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            content_type: content_type.into(),
            data,
            original_location: None,
        }
    }

    pub fn image(filename: Option<String>, data: Vec<u8>, kind: ImageContentType) -> Self {
        Self::new(filename, data, kind.as_str())
    }

    /// Read an asset from disk. The filename defaults to the file's name.
    pub fn from_file(path: &std::path::Path, content_type: impl Into<String>) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let mut asset = Self::new(filename, data, content_type);
        asset.original_location = Some(path.display().to_string());
        Ok(asset)
    }

    pub fn content_length(&self) -> usize {
        self.data.len()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}
