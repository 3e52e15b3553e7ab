use serde::{Deserialize, Serialize};
use solarcare_storage::keys;

use crate::api::{decode, ApiClient};
use crate::error::ApiError;
use crate::query_cache::CacheTag;
use crate::request::ApiRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// A catalog entry, e.g. rooftop installation or panel cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub category_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Indicative starting price in the smallest currency unit.
    #[serde(default)]
    pub starting_price: Option<u64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ApiClient {
    /// List services, optionally restricted to one category.
    pub async fn list_services(&self, category_id: Option<&str>) -> Result<Vec<Service>, ApiError> {
        let data = match category_id {
            Some(category) => {
                self.query(
                    &format!("services:{category}"),
                    ApiRequest::get("/services").with_param("category", category),
                    vec![CacheTag::Service],
                )
                .await?
            }
            None => {
                self.query_persisted(
                    "services",
                    keys::CACHE_SERVICES,
                    ApiRequest::get("/services"),
                    vec![CacheTag::Service],
                )
                .await?
            }
        };
        decode(data)
    }

    pub async fn get_service(&self, id: &str) -> Result<Service, ApiError> {
        let data = self
            .query(
                &format!("service:{id}"),
                ApiRequest::get(format!("/services/{id}")),
                vec![CacheTag::Service],
            )
            .await?;
        decode(data)
    }

    pub async fn list_categories(&self) -> Result<Vec<ServiceCategory>, ApiError> {
        let data = self
            .query_persisted(
                "service_categories",
                keys::CACHE_SERVICE_CATEGORIES,
                ApiRequest::get("/services/categories"),
                vec![CacheTag::ServiceCategory],
            )
            .await?;
        decode(data)
    }
}
