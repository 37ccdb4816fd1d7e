//! Row models for the five hosted relations, plus the normalization of
//! embedded (joined) entities.
//!
//! Depending on query shape, the store returns a joined relation either as
//! a single object or as a one-element array. That ambiguity is flattened
//! here, at the adapter boundary: embedded fields always deserialize to a
//! nullable single entity before they reach any handler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Lookup entity: a client the loads are shipped for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub nom: String,
    #[serde(default)]
    pub prenom: Option<String>,
}

/// Lookup entity: a carrier (transporteur) hauling the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carrier {
    pub id: Uuid,
    pub nom: String,
}

/// Lookup entity: a product that can appear on load lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub nom: String,
    #[serde(default)]
    pub poids: Option<f64>,
}

/// A `chargements` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: Uuid,
    pub date_chargement: NaiveDate,
    pub client_id: Uuid,
    pub transport_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Header fields for inserting or updating a `chargements` row.
#[derive(Debug, Clone, Serialize)]
pub struct NewLoad {
    pub client_id: Uuid,
    pub transport_id: Uuid,
    pub date_chargement: NaiveDate,
}

/// A `chargement_produits` row. At most one line may exist per
/// (chargement, produit) pair; the store enforces this with a uniqueness
/// constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadLine {
    pub produit_id: Uuid,
    pub quantite: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLoadLine {
    pub chargement_id: Uuid,
    pub produit_id: Uuid,
    pub quantite: i64,
}

/// Name-only projections of the related entities embedded in list reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRef {
    pub nom: String,
    #[serde(default)]
    pub prenom: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierRef {
    pub nom: String,
}

/// List-view projection of a load with its embedded client and carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSummary {
    pub id: Uuid,
    pub date_chargement: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "embedded", rename = "clients")]
    pub client: Option<ClientRef>,
    #[serde(default, deserialize_with = "embedded", rename = "transports")]
    pub carrier: Option<CarrierRef>,
}

/// Accept an embedded relation as `null`, a single object, or a
/// one-element array, and normalize to `Option<T>`.
fn embedded<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(v)) => Some(v),
        Some(OneOrMany::Many(vs)) => vs.into_iter().next(),
    })
}
