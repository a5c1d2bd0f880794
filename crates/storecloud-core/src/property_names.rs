//! Well-known metadata property names.
//!
//! Values follow the CMIS/Alfresco vocabulary so that metadata moves between
//! backends without translation. Every other property name is opaque.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoragePropertyNames {
    /// Node name; updating it renames the node.
    Name,
    ObjectId,
    BaseTypeId,
    ObjectTypeId,
    Title,
    Description,
    ContentStreamLength,
    ContentStreamMimeType,
    CreationDate,
    LastModificationDate,
    /// Aspects attached to the node.
    SecondaryObjectTypeIds,
}

impl StoragePropertyNames {
    pub const fn value(&self) -> &'static str {
        match self {
            StoragePropertyNames::Name => "cmis:name",
            StoragePropertyNames::ObjectId => "cmis:objectId",
            StoragePropertyNames::BaseTypeId => "cmis:baseTypeId",
            StoragePropertyNames::ObjectTypeId => "cmis:objectTypeId",
            StoragePropertyNames::Title => "cm:title",
            StoragePropertyNames::Description => "cm:description",
            StoragePropertyNames::ContentStreamLength => "cmis:contentStreamLength",
            StoragePropertyNames::ContentStreamMimeType => "cmis:contentStreamMimeType",
            StoragePropertyNames::CreationDate => "cmis:creationDate",
            StoragePropertyNames::LastModificationDate => "cmis:lastModificationDate",
            StoragePropertyNames::SecondaryObjectTypeIds => "cmis:secondaryObjectTypeIds",
        }
    }

    /// Properties computed by the backend on resolution. Callers cannot set them.
    pub fn is_system(name: &str) -> bool {
        [
            StoragePropertyNames::ObjectId,
            StoragePropertyNames::BaseTypeId,
            StoragePropertyNames::ContentStreamLength,
            StoragePropertyNames::CreationDate,
            StoragePropertyNames::LastModificationDate,
        ]
        .iter()
        .any(|p| p.value() == name)
    }
}

impl AsRef<str> for StoragePropertyNames {
    fn as_ref(&self) -> &str {
        self.value()
    }
}

/// Base type of a node, stored under `cmis:baseTypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Folder,
    Document,
}

impl BaseType {
    pub const fn value(&self) -> &'static str {
        match self {
            BaseType::Folder => "cmis:folder",
            BaseType::Document => "cmis:document",
        }
    }
}
