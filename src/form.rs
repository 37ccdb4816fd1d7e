//! Load form model.
//!
//! Ordered list of (product, quantity) line entries behind the create and
//! edit forms, with the add/remove invariants and the cross-line duplicate
//! validation, plus the submit sequences against the record store.
//!
//! The submit chains are deliberately not atomic, mirroring the store's
//! lack of cross-table transactions: create inserts the load row and only
//! then its lines (a failure in between leaves an orphaned load with no
//! lines); update rewrites the header, deletes every existing line, then
//! upserts the new set (a failure after the delete leaves the load with
//! zero lines). Partial states are reported to the user as-is, never
//! rolled back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{NewLoad, NewLoadLine, RecordStore, StoreError};

/// One editable (product, quantity) line. Fields arrive as submitted
/// strings; parsing happens during validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineEntry {
    pub produit_id: String,
    pub quantite: i64,
}

impl Default for LineEntry {
    fn default() -> Self {
        Self {
            produit_id: String::new(),
            quantite: 1,
        }
    }
}

/// Field-keyed validation messages, e.g. `lignes.1.produit_id`.
pub type FieldErrors = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadForm {
    pub client_id: String,
    pub transport_id: String,
    pub date_chargement: String,
    pub lignes: Vec<LineEntry>,
}

impl Default for LoadForm {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadForm {
    /// A fresh form always starts with one blank line.
    pub fn new() -> Self {
        Self {
            client_id: String::new(),
            transport_id: String::new(),
            date_chargement: String::new(),
            lignes: vec![LineEntry::default()],
        }
    }

    /// Append a blank line (quantity defaulted to 1). No upper bound.
    pub fn add_line(&mut self) {
        self.lignes.push(LineEntry::default());
    }

    /// Remove the line at `index`. Refused when exactly one line remains:
    /// the form always keeps at least one line.
    pub fn remove_line(&mut self, index: usize) {
        if self.lignes.len() <= 1 || index >= self.lignes.len() {
            return;
        }
        self.lignes.remove(index);
    }

    /// Validate header and lines. Beyond the required-field checks, a
    /// cross-line pass flags *every* line sharing a non-empty product id,
    /// not just the later occurrences, so fixing either entry clears both
    /// messages on revalidation.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.client_id.trim().is_empty() {
            errors.insert("client_id".into(), "Sélectionner un client".into());
        } else if Uuid::parse_str(self.client_id.trim()).is_err() {
            errors.insert("client_id".into(), "Client invalide".into());
        }

        if self.transport_id.trim().is_empty() {
            errors.insert("transport_id".into(), "Sélectionner un transporteur".into());
        } else if Uuid::parse_str(self.transport_id.trim()).is_err() {
            errors.insert("transport_id".into(), "Transporteur invalide".into());
        }

        if self.date_chargement.trim().is_empty() {
            errors.insert("date_chargement".into(), "Renseigner une date".into());
        } else if self.date_chargement.trim().parse::<chrono::NaiveDate>().is_err() {
            errors.insert("date_chargement".into(), "Date invalide".into());
        }

        if self.lignes.is_empty() {
            errors.insert("lignes".into(), "Ajouter au moins un produit".into());
        }

        for (i, line) in self.lignes.iter().enumerate() {
            let key = format!("lignes.{}.produit_id", i);
            if line.produit_id.trim().is_empty() {
                errors.insert(key, "Sélectionner un produit".into());
            } else if Uuid::parse_str(line.produit_id.trim()).is_err() {
                errors.insert(key, "Produit invalide".into());
            }
            if line.quantite < 1 {
                errors.insert(format!("lignes.{}.quantite", i), "Quantité > 0".into());
            }
        }

        // Cross-line duplicate pass over non-empty product ids.
        let mut seen: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, line) in self.lignes.iter().enumerate() {
            let id = line.produit_id.trim();
            if !id.is_empty() {
                seen.entry(id).or_default().push(i);
            }
        }
        for indexes in seen.values() {
            if indexes.len() > 1 {
                for &i in indexes {
                    errors.insert(
                        format!("lignes.{}.produit_id", i),
                        "Produit en double sur ce chargement".into(),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Header fields parsed into store types. Call after `validate`.
    fn header(&self) -> Result<NewLoad, FieldErrors> {
        self.validate()?;
        Ok(NewLoad {
            client_id: Uuid::parse_str(self.client_id.trim()).expect("validated"),
            transport_id: Uuid::parse_str(self.transport_id.trim()).expect("validated"),
            date_chargement: self
                .date_chargement
                .trim()
                .parse()
                .expect("validated"),
        })
    }

    fn lines_for(&self, load_id: Uuid) -> Vec<NewLoadLine> {
        self.lignes
            .iter()
            .map(|l| NewLoadLine {
                chargement_id: load_id,
                produit_id: Uuid::parse_str(l.produit_id.trim()).expect("validated"),
                quantite: l.quantite,
            })
            .collect()
    }

    /// Insert the load row, then its lines. The line insert only runs
    /// after a successful load insert.
    pub async fn submit_create(&self, store: &dyn RecordStore) -> Result<Uuid, SubmitError> {
        let header = self.header().map_err(SubmitError::Validation)?;
        let load_id = store.insert_load(&header).await?;
        store.insert_load_lines(&self.lines_for(load_id)).await?;
        Ok(load_id)
    }

    /// Update the header, delete all existing lines, upsert the new set
    /// keyed on (chargement, produit).
    pub async fn submit_update(
        &self,
        store: &dyn RecordStore,
        load_id: Uuid,
    ) -> Result<(), SubmitError> {
        let header = self.header().map_err(SubmitError::Validation)?;
        store.update_load(load_id, &header).await?;
        store.delete_load_lines(load_id).await?;
        store.upsert_load_lines(&self.lines_for(load_id)).await?;
        Ok(())
    }
}

/// Delete the load row only; the store cascades the line rows.
pub async fn submit_delete(store: &dyn RecordStore, load_id: Uuid) -> Result<(), StoreError> {
    store.delete_load(load_id).await
}

#[derive(Debug)]
pub enum SubmitError {
    Validation(FieldErrors),
    Store(StoreError),
}

impl From<StoreError> for SubmitError {
    fn from(err: StoreError) -> Self {
        SubmitError::Store(err)
    }
}

impl From<SubmitError> for crate::error::ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(field_errors) => crate::error::ApiError::validation_error(
                "Le formulaire contient des erreurs.",
                field_errors,
            ),
            SubmitError::Store(store_err) => store_err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Carrier, Client, Load, LoadLine, LoadSummary, Product};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const C1: &str = "11111111-1111-1111-1111-111111111111";
    const T1: &str = "22222222-2222-2222-2222-222222222222";
    const P1: &str = "33333333-3333-3333-3333-333333333333";
    const P2: &str = "44444444-4444-4444-4444-444444444444";

    fn valid_form() -> LoadForm {
        LoadForm {
            client_id: C1.into(),
            transport_id: T1.into(),
            date_chargement: "2024-01-10".into(),
            lignes: vec![
                LineEntry {
                    produit_id: P1.into(),
                    quantite: 2,
                },
                LineEntry {
                    produit_id: P2.into(),
                    quantite: 3,
                },
            ],
        }
    }

    /// Records the operation sequence and can fail a named operation,
    /// standing in for the hosted store.
    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingStore {
        fn failing(op: &'static str) -> Self {
            Self {
                ops: Mutex::new(vec![]),
                fail_on: Some(op),
            }
        }

        fn record(&self, op: &str) -> Result<(), StoreError> {
            self.ops.lock().unwrap().push(op.to_string());
            if self.fail_on == Some(op) {
                return Err(StoreError::Constraint {
                    code: "23505".into(),
                    message: "duplicate key value violates unique constraint".into(),
                });
            }
            Ok(())
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
            Ok(vec![])
        }
        async fn list_carriers(&self) -> Result<Vec<Carrier>, StoreError> {
            Ok(vec![])
        }
        async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
            Ok(vec![])
        }
        async fn list_loads(&self) -> Result<Vec<LoadSummary>, StoreError> {
            Ok(vec![])
        }
        async fn get_load(&self, _: Uuid) -> Result<Option<Load>, StoreError> {
            Ok(None)
        }
        async fn list_load_lines(&self, _: Uuid) -> Result<Vec<LoadLine>, StoreError> {
            Ok(vec![])
        }
        async fn insert_load(&self, _: &NewLoad) -> Result<Uuid, StoreError> {
            self.record("insert_load")?;
            Ok(Uuid::new_v4())
        }
        async fn update_load(&self, _: Uuid, _: &NewLoad) -> Result<(), StoreError> {
            self.record("update_load")
        }
        async fn delete_load(&self, _: Uuid) -> Result<(), StoreError> {
            self.record("delete_load")
        }
        async fn insert_load_lines(&self, lines: &[NewLoadLine]) -> Result<(), StoreError> {
            self.ops
                .lock()
                .unwrap()
                .push(format!("insert_load_lines:{}", lines.len()));
            if self.fail_on == Some("insert_load_lines") {
                return Err(StoreError::Constraint {
                    code: "23505".into(),
                    message: "duplicate key".into(),
                });
            }
            Ok(())
        }
        async fn delete_load_lines(&self, _: Uuid) -> Result<(), StoreError> {
            self.record("delete_load_lines")
        }
        async fn upsert_load_lines(&self, _: &[NewLoadLine]) -> Result<(), StoreError> {
            self.record("upsert_load_lines")
        }
    }

    #[test]
    fn new_form_has_one_blank_line() {
        let form = LoadForm::new();
        assert_eq!(form.lignes.len(), 1);
        assert_eq!(form.lignes[0], LineEntry::default());
    }

    #[test]
    fn add_then_remove_restores_prior_state() {
        let mut form = valid_form();
        let before = form.lignes.clone();
        form.add_line();
        assert_eq!(form.lignes.len(), 3);
        form.remove_line(2);
        assert_eq!(form.lignes, before);
    }

    #[test]
    fn remove_refused_when_one_line_remains() {
        let mut form = LoadForm::new();
        form.remove_line(0);
        assert_eq!(form.lignes.len(), 1);
    }

    #[test]
    fn remove_out_of_bounds_is_a_no_op() {
        let mut form = valid_form();
        form.remove_line(7);
        assert_eq!(form.lignes.len(), 2);
    }

    #[test]
    fn duplicate_product_flags_every_offending_line() {
        let mut form = valid_form();
        form.lignes[1].produit_id = P1.into();
        let errors = form.validate().unwrap_err();
        assert!(errors.contains_key("lignes.0.produit_id"));
        assert!(errors.contains_key("lignes.1.produit_id"));

        // Fixing one line clears both flags
        form.lignes[1].produit_id = P2.into();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn empty_products_are_not_counted_as_duplicates() {
        let mut form = valid_form();
        form.lignes[0].produit_id = String::new();
        form.lignes[1].produit_id = String::new();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("lignes.0.produit_id").map(String::as_str),
            Some("Sélectionner un produit")
        );
        assert_eq!(
            errors.get("lignes.1.produit_id").map(String::as_str),
            Some("Sélectionner un produit")
        );
    }

    #[test]
    fn header_fields_are_required() {
        let form = LoadForm::new();
        let errors = form.validate().unwrap_err();
        assert!(errors.contains_key("client_id"));
        assert!(errors.contains_key("transport_id"));
        assert!(errors.contains_key("date_chargement"));
        assert!(errors.contains_key("lignes.0.produit_id"));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let mut form = valid_form();
        form.lignes[0].quantite = 0;
        let errors = form.validate().unwrap_err();
        assert!(errors.contains_key("lignes.0.quantite"));
    }

    #[tokio::test]
    async fn create_inserts_load_then_lines() {
        let store = RecordingStore::default();
        valid_form().submit_create(&store).await.unwrap();
        assert_eq!(store.ops(), vec!["insert_load", "insert_load_lines:2"]);
    }

    #[tokio::test]
    async fn create_skips_lines_when_load_insert_fails() {
        let store = RecordingStore::failing("insert_load");
        let err = valid_form().submit_create(&store).await.unwrap_err();
        assert!(matches!(err, SubmitError::Store(_)));
        assert_eq!(store.ops(), vec!["insert_load"]);
    }

    #[tokio::test]
    async fn update_runs_header_delete_upsert_in_order() {
        let store = RecordingStore::default();
        valid_form()
            .submit_update(&store, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(
            store.ops(),
            vec!["update_load", "delete_load_lines", "upsert_load_lines"]
        );
    }

    // The delete-then-insert replacement is not atomic: when the upsert
    // fails, the lines are already gone. Accepted boundary condition.
    #[tokio::test]
    async fn update_failure_after_delete_leaves_lines_deleted() {
        let store = RecordingStore::failing("upsert_load_lines");
        let err = valid_form()
            .submit_update(&store, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Store(StoreError::Constraint { .. })));
        assert_eq!(
            store.ops(),
            vec!["update_load", "delete_load_lines", "upsert_load_lines"]
        );
    }

    #[tokio::test]
    async fn delete_touches_only_the_load_row() {
        let store = RecordingStore::default();
        submit_delete(&store, Uuid::new_v4()).await.unwrap();
        assert_eq!(store.ops(), vec!["delete_load"]);
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_the_store() {
        let store = RecordingStore::default();
        let err = LoadForm::new().submit_create(&store).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert!(store.ops().is_empty());
    }
}
