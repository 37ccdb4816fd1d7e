//! Record store adapter.
//!
//! Thin typed interface over five hosted relations: `clients`,
//! `transports`, `produits`, `chargements` and `chargement_produits`.
//! The store is an opaque REST service; this module owns the request
//! plumbing, the row models, and the translation of the store's
//! duck-typed error payloads into a tagged [`StoreError`].

pub mod http;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use http::HttpRecordStore;
pub use models::{
    Carrier, Client, Load, LoadLine, LoadSummary, NewLoad, NewLoadLine, Product,
};

/// Tagged store error. The store reports failures as a JSON body with a
/// stable `code` field plus free-form text; classification inspects the
/// code first and falls back to message patterns only as a best-effort
/// last resort.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness violation on (chargement, produit): either the unique
    /// constraint itself or the "cannot affect row a second time" failure
    /// from upserting the same logical row twice in one batch.
    #[error("constraint violation ({code}): {message}")]
    Constraint { code: String, message: String },

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("store error ({code}): {message}")]
    Unknown { code: String, message: String },
}

impl StoreError {
    /// Classify a non-success store response body.
    pub fn classify(code: &str, message: &str) -> Self {
        // Stable codes first: unique_violation, cardinality_violation
        // (second write to the same row in one statement), and the
        // store's own single-row-expected code.
        match code {
            "23505" | "21000" => {
                return StoreError::Constraint {
                    code: code.to_string(),
                    message: message.to_string(),
                }
            }
            "PGRST116" => return StoreError::NotFound,
            _ => {}
        }

        // Best-effort message fallback for deployments that mangle codes.
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("duplicate key") || lowered.contains("cannot affect row a second time")
        {
            return StoreError::Constraint {
                code: code.to_string(),
                message: message.to_string(),
            };
        }

        StoreError::Unknown {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Capability interface over the record store, one method per operation
/// the application performs. Reads are plain filtered selects; writes are
/// insert, update-by-id, delete-by-id and a batched upsert keyed on
/// (chargement, produit).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;
    async fn list_carriers(&self) -> Result<Vec<Carrier>, StoreError>;
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn list_loads(&self) -> Result<Vec<LoadSummary>, StoreError>;
    async fn get_load(&self, id: Uuid) -> Result<Option<Load>, StoreError>;
    async fn list_load_lines(&self, load_id: Uuid) -> Result<Vec<LoadLine>, StoreError>;

    async fn insert_load(&self, new: &NewLoad) -> Result<Uuid, StoreError>;
    async fn update_load(&self, id: Uuid, fields: &NewLoad) -> Result<(), StoreError>;
    /// Deleting a load cascades to its lines store-side; the application
    /// never deletes lines as part of a load delete.
    async fn delete_load(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_load_lines(&self, lines: &[NewLoadLine]) -> Result<(), StoreError>;
    async fn delete_load_lines(&self, load_id: Uuid) -> Result<(), StoreError>;
    async fn upsert_load_lines(&self, lines: &[NewLoadLine]) -> Result<(), StoreError>;
}
