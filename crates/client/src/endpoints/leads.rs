use serde::{Deserialize, Serialize};
use serde_json::json;
use solarcare_core::types::Timestamp;
use solarcare_storage::keys;

use crate::api::{decode, ApiClient, Submission};
use crate::error::ApiError;
use crate::query_cache::CacheTag;
use crate::request::ApiRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    SiteSurvey,
    Quoted,
    Accepted,
    Installed,
    Closed,
}

/// A customer's request for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub service_id: String,
    pub status: LeadStatus,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub id: String,
    pub lead_id: String,
    /// Total in the smallest currency unit.
    pub amount: u64,
    pub status: QuotationStatus,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub lead_id: String,
    pub name: String,
    pub url: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub name: String,
    pub url: String,
}

impl ApiClient {
    pub async fn list_leads(&self) -> Result<Vec<Lead>, ApiError> {
        let data = self
            .query_persisted(
                "leads",
                keys::CACHE_LEADS,
                ApiRequest::get("/leads"),
                vec![CacheTag::Lead],
            )
            .await?;
        decode(data)
    }

    pub async fn get_lead(&self, id: &str) -> Result<Lead, ApiError> {
        let data = self
            .query(
                &format!("lead:{id}"),
                ApiRequest::get(format!("/leads/{id}")),
                vec![CacheTag::LeadItem(id.to_string())],
            )
            .await?;
        decode(data)
    }

    /// Submit a new lead. Queued for replay when the server is unreachable.
    pub async fn create_lead(&self, lead: &NewLead) -> Result<Submission<Lead>, ApiError> {
        let body = serde_json::to_value(lead).map_err(|e| ApiError::Validation(e.to_string()))?;
        self.mutate_or_queue(ApiRequest::post("/leads", body), &[CacheTag::Lead])
            .await?
            .try_map(decode)
    }

    pub async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Lead, ApiError> {
        let data = self
            .mutate(
                ApiRequest::patch(format!("/leads/{id}/status"), json!({ "status": status })),
                &[CacheTag::Lead, CacheTag::LeadItem(id.to_string())],
            )
            .await?;
        decode(data)
    }

    pub async fn list_quotations(&self, lead_id: &str) -> Result<Vec<Quotation>, ApiError> {
        let data = self
            .query(
                &format!("quotations:{lead_id}"),
                ApiRequest::get(format!("/leads/{lead_id}/quotations")),
                vec![CacheTag::Quotation],
            )
            .await?;
        decode(data)
    }

    /// Accept or reject a quotation. Accepting moves the lead forward, so
    /// lead entries are staled too.
    pub async fn respond_to_quotation(
        &self,
        quotation_id: &str,
        accept: bool,
        comment: Option<&str>,
    ) -> Result<Quotation, ApiError> {
        let data = self
            .mutate(
                ApiRequest::post(
                    format!("/quotations/{quotation_id}/respond"),
                    json!({ "accept": accept, "comment": comment }),
                ),
                &[CacheTag::Quotation, CacheTag::Lead],
            )
            .await?;
        decode(data)
    }

    pub async fn list_documents(&self, lead_id: &str) -> Result<Vec<Document>, ApiError> {
        let data = self
            .query(
                &format!("documents:{lead_id}"),
                ApiRequest::get(format!("/leads/{lead_id}/documents")),
                vec![CacheTag::Document],
            )
            .await?;
        decode(data)
    }

    /// Attach a document to a lead. Queued for replay when the server is
    /// unreachable.
    pub async fn add_document(
        &self,
        lead_id: &str,
        document: &NewDocument,
    ) -> Result<Submission<Document>, ApiError> {
        let body = serde_json::to_value(document).map_err(|e| ApiError::Validation(e.to_string()))?;
        self.mutate_or_queue(
            ApiRequest::post(format!("/leads/{lead_id}/documents"), body),
            &[CacheTag::Document],
        )
        .await?
        .try_map(decode)
    }
}
