//! The document a charge is "for".
//!
//! Stripe metadata carries the target as a `(collection, document)` string pair.
//! Only the collections listed here are accepted; anything else is rejected
//! when the pair is parsed.

use std::fmt;

use crate::domain::foundation::{UserId, ValidationError};

/// Typed reference to an associated document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Association {
    /// A user document, keyed by user id.
    User(UserId),
    /// A product document, keyed by product id.
    Product(String),
}

impl Association {
    /// Parses the metadata pair.
    ///
    /// Collection names are matched case-insensitively against the
    /// supported set (`users`, `products`).
    pub fn parse(collection: &str, document: &str) -> Result<Self, AssociationError> {
        if document.trim().is_empty() {
            return Err(AssociationError::EmptyDocument);
        }

        match collection.to_ascii_lowercase().as_str() {
            "users" => Ok(Association::User(UserId::new(document)?)),
            "products" => Ok(Association::Product(document.to_string())),
            _ => Err(AssociationError::UnknownCollection(collection.to_string())),
        }
    }

    /// Parses an optional pair, treating a half-filled pair as absent.
    pub fn parse_optional(
        collection: Option<&str>,
        document: Option<&str>,
    ) -> Result<Option<Self>, AssociationError> {
        match (collection, document) {
            (Some(c), Some(d)) if !c.is_empty() && !d.is_empty() => Self::parse(c, d).map(Some),
            _ => Ok(None),
        }
    }

    /// Collection name written back to Stripe metadata and storage.
    pub fn collection_name(&self) -> &'static str {
        match self {
            Association::User(_) => "users",
            Association::Product(_) => "products",
        }
    }

    /// Document id within the collection.
    pub fn document_id(&self) -> &str {
        match self {
            Association::User(id) => id.as_str(),
            Association::Product(id) => id,
        }
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_name(), self.document_id())
    }
}

/// Reasons an association pair is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssociationError {
    #[error("unknown associated collection '{0}'")]
    UnknownCollection(String),

    #[error("associated document id is empty")]
    EmptyDocument,

    #[error(transparent)]
    InvalidId(#[from] ValidationError),
}
