//! Descriptor for a document about to be stored.

use crate::object::{Metadata, PropertyValue};
use crate::property_names::StoragePropertyNames;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageFile {
    pub file_name: String,
    pub content_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub aspects: Vec<String>,
    pub metadata: Metadata,
}

impl StorageFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        StorageFile {
            file_name: file_name.into(),
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspects.push(aspect.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Flatten the descriptor into the property bag a driver stores.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert(
            StoragePropertyNames::Name.value().to_string(),
            self.file_name.clone().into(),
        );
        if let Some(title) = &self.title {
            metadata.insert(StoragePropertyNames::Title.value().to_string(), title.clone().into());
        }
        if let Some(description) = &self.description {
            metadata.insert(
                StoragePropertyNames::Description.value().to_string(),
                description.clone().into(),
            );
        }
        if !self.aspects.is_empty() {
            metadata.insert(
                StoragePropertyNames::SecondaryObjectTypeIds.value().to_string(),
                self.aspects.clone().into(),
            );
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_metadata_includes_name_title_and_aspects() {
        let file = StorageFile::new("contratto.pdf", "application/pdf")
            .with_title("Contratto")
            .with_aspect("P:cm:titled")
            .with_property("sigla:anno", 2025i64);

        let metadata = file.to_metadata();
        assert_eq!(metadata.get("cmis:name"), Some(&PropertyValue::from("contratto.pdf")));
        assert_eq!(metadata.get("cm:title"), Some(&PropertyValue::from("Contratto")));
        assert!(metadata.get("cm:description").is_none());
        assert_eq!(metadata.get("sigla:anno"), Some(&PropertyValue::Integer(2025)));
        assert_eq!(
            metadata.get("cmis:secondaryObjectTypeIds"),
            Some(&PropertyValue::from(vec!["P:cm:titled".to_string()]))
        );
    }
}
