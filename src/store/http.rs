//! REST implementation of the record store capability.
//!
//! One instance is built per request, scoped to that request's caller:
//! reads and writes carry the public `apikey` plus the caller's access
//! token as bearer credential, so the store applies its own row-level
//! rules. Falls back to the anonymous key when no session exists (the
//! login page has no caller yet).

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::AppConfig;

use super::models::{Carrier, Client, Load, LoadLine, LoadSummary, NewLoad, NewLoadLine, Product};
use super::{RecordStore, StoreError};

pub struct HttpRecordStore {
    http: reqwest::Client,
    config: &'static AppConfig,
    bearer: String,
}

/// Error body shape the store returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpRecordStore {
    pub fn new(
        http: reqwest::Client,
        config: &'static AppConfig,
        access_token: Option<&str>,
    ) -> Self {
        let bearer = access_token.unwrap_or(&config.anon_key).to_string();
        Self {
            http,
            config,
            bearer,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.config.rest_endpoint(table))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.bearer)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        let body: StoreErrorBody = response.json().await.unwrap_or(StoreErrorBody {
            code: String::new(),
            message: format!("store responded with status {}", status),
        });
        Err(StoreError::classify(&body.code, &body.message))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, table)
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait::async_trait]
impl RecordStore for HttpRecordStore {
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        self.select(
            "clients",
            &[("select", "id,nom,prenom"), ("order", "nom.asc")],
        )
        .await
    }

    async fn list_carriers(&self) -> Result<Vec<Carrier>, StoreError> {
        self.select("transports", &[("select", "id,nom"), ("order", "nom.asc")])
            .await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.select(
            "produits",
            &[("select", "id,nom,poids"), ("order", "nom.asc")],
        )
        .await
    }

    async fn list_loads(&self) -> Result<Vec<LoadSummary>, StoreError> {
        self.select(
            "chargements",
            &[
                (
                    "select",
                    "id,date_chargement,created_at,clients(nom,prenom),transports(nom)",
                ),
                ("order", "created_at.desc"),
            ],
        )
        .await
    }

    async fn get_load(&self, id: Uuid) -> Result<Option<Load>, StoreError> {
        let id_filter = format!("eq.{}", id);
        let rows: Vec<Load> = self
            .select(
                "chargements",
                &[
                    ("select", "id,date_chargement,client_id,transport_id,created_at"),
                    ("id", &id_filter),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_load_lines(&self, load_id: Uuid) -> Result<Vec<LoadLine>, StoreError> {
        let load_filter = format!("eq.{}", load_id);
        self.select(
            "chargement_produits",
            &[
                ("select", "produit_id,quantite"),
                ("chargement_id", &load_filter),
                ("order", "id.asc"),
            ],
        )
        .await
    }

    async fn insert_load(&self, new: &NewLoad) -> Result<Uuid, StoreError> {
        #[derive(Deserialize)]
        struct Inserted {
            id: Uuid,
        }

        let response = self
            .request(reqwest::Method::POST, "chargements")
            .header("Prefer", "return=representation")
            .query(&[("select", "id")])
            .json(new)
            .send()
            .await?;
        let rows: Vec<Inserted> = Self::check(response).await?.json().await?;
        rows.into_iter().next().map(|r| r.id).ok_or_else(|| {
            StoreError::Unknown {
                code: String::new(),
                message: "insert returned no row".to_string(),
            }
        })
    }

    async fn update_load(&self, id: Uuid, fields: &NewLoad) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::PATCH, "chargements")
            .query(&[("id", &format!("eq.{}", id))])
            .json(fields)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_load(&self, id: Uuid) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::DELETE, "chargements")
            .query(&[("id", &format!("eq.{}", id))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert_load_lines(&self, lines: &[NewLoadLine]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::POST, "chargement_produits")
            .json(lines)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_load_lines(&self, load_id: Uuid) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::DELETE, "chargement_produits")
            .query(&[("chargement_id", &format!("eq.{}", load_id))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert_load_lines(&self, lines: &[NewLoadLine]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::POST, "chargement_produits")
            .header("Prefer", "resolution=merge-duplicates")
            .query(&[("on_conflict", "chargement_id,produit_id")])
            .json(lines)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
