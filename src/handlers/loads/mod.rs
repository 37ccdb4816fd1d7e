//! Load (chargement) endpoints: list and form view data, plus the create,
//! update and delete submissions routed through the form model.
//!
//! Every view dispatches its reads concurrently (they are mutually
//! independent lookups with no ordering requirement) and joins them
//! before responding. Mutations respond with a `redirect` target so the
//! caller navigates back to the list and refetches it, keeping the list
//! consistent with the write.

use axum::{
    extract::Path,
    response::Json,
    Extension,
};
use futures::try_join;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend;
use crate::error::ApiError;
use crate::form::{submit_delete, LoadForm};
use crate::guard::CurrentUser;
use crate::store::RecordStore;

/// GET /chargements - all loads, newest first, with their client and
/// carrier names embedded.
pub async fn list(Extension(user): Extension<CurrentUser>) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    let chargements = store.list_loads().await?;
    Ok(Json(json!({
        "success": true,
        "data": { "chargements": chargements }
    })))
}

/// GET /nouveau-chargement - option lists for the create form.
pub async fn new_view(Extension(user): Extension<CurrentUser>) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    let (clients, transports, produits) = try_join!(
        store.list_clients(),
        store.list_carriers(),
        store.list_products()
    )?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "clients": clients,
            "transports": transports,
            "produits": produits,
            "form": LoadForm::new()
        }
    })))
}

/// GET /chargements/:id/edit - the target load, its lines, and the option
/// lists, prefilled as form values.
pub async fn edit_view(
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    let (chargement, lignes, clients, transports, produits) = try_join!(
        store.get_load(id),
        store.list_load_lines(id),
        store.list_clients(),
        store.list_carriers(),
        store.list_products()
    )?;

    let chargement = chargement.ok_or_else(|| ApiError::not_found("Chargement introuvable."))?;

    let form = LoadForm {
        client_id: chargement.client_id.to_string(),
        transport_id: chargement.transport_id.to_string(),
        date_chargement: chargement.date_chargement.to_string(),
        lignes: lignes
            .iter()
            .map(|l| crate::form::LineEntry {
                produit_id: l.produit_id.to_string(),
                quantite: l.quantite,
            })
            .collect(),
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "chargement": chargement,
            "form": form,
            "clients": clients,
            "transports": transports,
            "produits": produits
        }
    })))
}

/// POST /chargements - create a load with its lines.
pub async fn create(
    Extension(user): Extension<CurrentUser>,
    Json(form): Json<LoadForm>,
) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    let id = form.submit_create(&store).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "id": id, "redirect": "/chargements" }
    })))
}

/// PUT /chargements/:id - update the header and replace all lines.
pub async fn update(
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(form): Json<LoadForm>,
) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    form.submit_update(&store, id).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "id": id, "redirect": "/chargements" }
    })))
}

/// DELETE /chargements/:id - delete the load; lines cascade store-side.
pub async fn delete(
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let store = backend::record_store(Some(&user.access_token));
    submit_delete(&store, id).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "redirect": "/chargements" }
    })))
}
