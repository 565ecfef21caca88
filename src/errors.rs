//! Typed error hierarchy for the studio.
//!
//! Storage and service code return `anyhow::Result` and raise a `StudioError`
//! inside it when the failure carries meaning for the caller (missing row,
//! slug collision, bad reorder). The HTTP edge downcasts to pick a status code.

use thiserror::Error;

/// Resource kinds named in `NotFound` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    User,
    Website,
    Page,
    Section,
    Element,
    Media,
    VCard,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::User => "User",
            ResourceKind::Website => "Website",
            ResourceKind::Page => "Page",
            ResourceKind::Section => "Section",
            ResourceKind::Element => "Element",
            ResourceKind::Media => "Media",
            ResourceKind::VCard => "VCard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StudioError {
    /// Missing rows and rows owned by another user both land here.
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Slug '{slug}' is already taken")]
    SlugTaken { slug: String },

    #[error("Email '{email}' is already registered")]
    EmailTaken { email: String },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type '{0}'")]
    UnsupportedMediaType(String),

    #[error("AI provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("AI provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        StudioError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
