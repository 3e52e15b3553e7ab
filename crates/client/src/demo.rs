//! In-process stand-in for the SolarCare backend.
//!
//! Serves the OTP login flow (`123456` is the only accepted code), a
//! static services catalog and per-phone leads, quotations and documents
//! held in memory. Protected routes require a bearer token issued by
//! `/auth/verify-otp`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use solarcare_core::types::{to_timestamp, Timestamp};
use solarcare_core::{Clock, CoreError, SystemClock};
use uuid::Uuid;

use crate::endpoints::leads::{Document, Lead, LeadStatus, Quotation, QuotationStatus};
use crate::endpoints::services::{Service, ServiceCategory};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

/// The OTP the demo backend accepts.
pub const DEMO_OTP: &str = "123456";

#[derive(Default)]
struct DemoState {
    /// Issued access token -> phone.
    tokens: HashMap<String, String>,
    /// Issued refresh token -> phone.
    refresh_tokens: HashMap<String, String>,
    /// Phone -> profile JSON.
    profiles: HashMap<String, Value>,
    /// Phones with an outstanding OTP.
    pending_otps: HashMap<String, String>,
    /// Lead id -> (owner phone, lead).
    leads: HashMap<String, (String, Lead)>,
    quotations: HashMap<String, Quotation>,
    documents: Vec<Document>,
}

#[derive(Clone)]
pub struct DemoTransport {
    state: Arc<Mutex<DemoState>>,
    calls: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    latency: Duration,
}

impl Default for DemoTransport {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl DemoTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DemoState::default())),
            calls: Arc::new(AtomicUsize::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
            clock,
            latency: Duration::ZERO,
        }
    }

    /// Simulate network latency on every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Simulate losing (or regaining) connectivity. While offline every
    /// request fails with a network error. Shared by all clones.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Timestamp {
        to_timestamp(self.clock.now_millis()).unwrap_or_default()
    }

    fn route(&self, request: &HttpRequest) -> HttpResponse {
        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let body = request.body.clone().unwrap_or(Value::Null);

        match (request.method, segments.as_slice()) {
            (Method::Post, ["auth", "send-otp"]) => self.send_otp(&body),
            (Method::Post, ["auth", "verify-otp"]) => self.verify_otp(&body),
            (Method::Post, ["auth", "refresh"]) => self.refresh(&body),
            (Method::Get, ["services"]) => {
                ok(filter_services(request.query_param("category")))
            }
            (Method::Get, ["services", "categories"]) => ok(categories()),
            (Method::Get, ["services", id]) => match catalog().into_iter().find(|s| s.id == *id) {
                Some(service) => ok(service),
                None => not_found("service", id),
            },
            _ => {
                let Some(phone) = self.authenticate(request) else {
                    return error(401, "Session expired, please log in again");
                };
                self.route_protected(request.method, &segments, &phone, &body)
            }
        }
    }

    fn route_protected(&self, method: Method, segments: &[&str], phone: &str, body: &Value) -> HttpResponse {
        match (method, segments) {
            (Method::Post, ["auth", "logout"]) => {
                self.lock().tokens.retain(|_, owner| owner != phone);
                ok(json!({ "message": "Logged out" }))
            }
            (Method::Get, ["auth", "profile"]) => match self.lock().profiles.get(phone) {
                Some(profile) => ok(profile.clone()),
                None => not_found("profile", phone),
            },
            (Method::Put, ["auth", "profile"]) => self.update_profile(phone, body),
            (Method::Get, ["leads"]) => {
                let state = self.lock();
                let mut leads: Vec<&Lead> = state
                    .leads
                    .values()
                    .filter(|(owner, _)| owner == phone)
                    .map(|(_, lead)| lead)
                    .collect();
                leads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                ok(leads)
            }
            (Method::Post, ["leads"]) => self.create_lead(phone, body),
            (Method::Get, ["leads", id]) => match self.owned_lead(phone, id) {
                Some(lead) => ok(lead),
                None => not_found("lead", id),
            },
            (Method::Patch, ["leads", id, "status"]) => self.update_lead_status(phone, id, body),
            (Method::Get, ["leads", id, "quotations"]) => {
                if self.owned_lead(phone, id).is_none() {
                    return not_found("lead", id);
                }
                let state = self.lock();
                let quotations: Vec<&Quotation> =
                    state.quotations.values().filter(|q| q.lead_id == *id).collect();
                ok(quotations)
            }
            (Method::Post, ["quotations", id, "respond"]) => self.respond_to_quotation(phone, id, body),
            (Method::Get, ["leads", id, "documents"]) => {
                if self.owned_lead(phone, id).is_none() {
                    return not_found("lead", id);
                }
                let state = self.lock();
                let documents: Vec<&Document> =
                    state.documents.iter().filter(|d| d.lead_id == *id).collect();
                ok(documents)
            }
            (Method::Post, ["leads", id, "documents"]) => self.add_document(phone, id, body),
            _ => error(404, "Not found"),
        }
    }

    fn authenticate(&self, request: &HttpRequest) -> Option<String> {
        let token = request.bearer_token()?;
        self.lock().tokens.get(token).cloned()
    }

    fn owned_lead(&self, phone: &str, id: &str) -> Option<Lead> {
        self.lock()
            .leads
            .get(id)
            .filter(|(owner, _)| owner == phone)
            .map(|(_, lead)| lead.clone())
    }

    // ---- auth ----

    fn send_otp(&self, body: &Value) -> HttpResponse {
        let Some(phone) = str_field(body, "phone") else {
            return error(400, "Phone number is required");
        };
        self.lock()
            .pending_otps
            .insert(phone.to_string(), DEMO_OTP.to_string());
        tracing::debug!("Demo OTP issued");
        ok(json!({ "message": "OTP sent successfully" }))
    }

    fn verify_otp(&self, body: &Value) -> HttpResponse {
        let (Some(phone), Some(otp)) = (str_field(body, "phone"), str_field(body, "otp")) else {
            return error(400, "Phone number and OTP are required");
        };
        if otp != DEMO_OTP {
            return error(400, "Invalid OTP");
        }

        let mut state = self.lock();
        state.pending_otps.remove(phone);
        let token = format!("demo-{}", Uuid::new_v4());
        let refresh_token = format!("demo-refresh-{}", Uuid::new_v4());
        state.tokens.insert(token.clone(), phone.to_string());
        state.refresh_tokens.insert(refresh_token.clone(), phone.to_string());
        let user = state
            .profiles
            .entry(phone.to_string())
            .or_insert_with(|| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "phone": phone,
                    "name": "",
                })
            })
            .clone();

        ok(json!({ "token": token, "refreshToken": refresh_token, "user": user }))
    }

    fn refresh(&self, body: &Value) -> HttpResponse {
        let Some(refresh_token) = str_field(body, "refreshToken") else {
            return error(400, "Refresh token is required");
        };
        let mut state = self.lock();
        let Some(phone) = state.refresh_tokens.get(refresh_token).cloned() else {
            return error(401, "Invalid refresh token");
        };
        let token = format!("demo-{}", Uuid::new_v4());
        state.tokens.insert(token.clone(), phone);
        ok(json!({ "token": token }))
    }

    fn update_profile(&self, phone: &str, body: &Value) -> HttpResponse {
        let mut state = self.lock();
        let Some(Value::Object(profile)) = state.profiles.get_mut(phone) else {
            return not_found("profile", phone);
        };
        if let Value::Object(patch) = body {
            for field in ["name", "email", "address"] {
                if let Some(value) = patch.get(field).filter(|v| !v.is_null()) {
                    profile.insert(field.to_string(), value.clone());
                }
            }
        }
        ok(Value::Object(profile.clone()))
    }

    // ---- leads ----

    fn create_lead(&self, phone: &str, body: &Value) -> HttpResponse {
        let Some(service_id) = str_field(body, "serviceId") else {
            return error(400, "serviceId is required");
        };
        let Some(service) = catalog().into_iter().find(|s| s.id == service_id) else {
            return error(400, "Unknown service");
        };

        let now = self.now();
        let lead = Lead {
            id: Uuid::now_v7().to_string(),
            service_id: service.id.clone(),
            status: LeadStatus::New,
            address: str_field(body, "address").map(str::to_owned),
            notes: str_field(body, "notes").map(str::to_owned),
            created_at: now,
        };
        let quotation = Quotation {
            id: Uuid::now_v7().to_string(),
            lead_id: lead.id.clone(),
            amount: service.starting_price.unwrap_or(0),
            status: QuotationStatus::Pending,
            comment: None,
            created_at: now,
        };

        let mut state = self.lock();
        state
            .leads
            .insert(lead.id.clone(), (phone.to_string(), lead.clone()));
        state.quotations.insert(quotation.id.clone(), quotation);
        ok(lead)
    }

    fn update_lead_status(&self, phone: &str, id: &str, body: &Value) -> HttpResponse {
        let status: LeadStatus = match body.get("status").cloned().map(serde_json::from_value) {
            Some(Ok(status)) => status,
            _ => return error(400, "Unknown lead status"),
        };
        let mut state = self.lock();
        match state.leads.get_mut(id) {
            Some((owner, lead)) if owner == phone => {
                lead.status = status;
                ok(lead.clone())
            }
            _ => not_found("lead", id),
        }
    }

    fn respond_to_quotation(&self, phone: &str, id: &str, body: &Value) -> HttpResponse {
        let Some(accept) = body.get("accept").and_then(Value::as_bool) else {
            return error(400, "accept is required");
        };
        let comment = str_field(body, "comment").map(str::to_owned);

        let mut state = self.lock();
        let Some(quotation) = state.quotations.get(id).cloned() else {
            return not_found("quotation", id);
        };
        match state.leads.get_mut(&quotation.lead_id) {
            Some((owner, lead)) if owner == phone => {
                if accept {
                    lead.status = LeadStatus::Accepted;
                }
            }
            _ => return not_found("quotation", id),
        }

        let Some(quotation) = state.quotations.get_mut(id) else {
            return not_found("quotation", id);
        };
        if quotation.status != QuotationStatus::Pending {
            return error(409, "Quotation already answered");
        }
        quotation.status = if accept {
            QuotationStatus::Accepted
        } else {
            QuotationStatus::Rejected
        };
        quotation.comment = comment;
        ok(quotation.clone())
    }

    fn add_document(&self, phone: &str, lead_id: &str, body: &Value) -> HttpResponse {
        if self.owned_lead(phone, lead_id).is_none() {
            return not_found("lead", lead_id);
        }
        let (Some(name), Some(url)) = (str_field(body, "name"), str_field(body, "url")) else {
            return error(400, "name and url are required");
        };
        let document = Document {
            id: Uuid::now_v7().to_string(),
            lead_id: lead_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            created_at: self.now(),
        };
        self.lock().documents.push(document.clone());
        ok(document)
    }
}

#[async_trait]
impl HttpTransport for DemoTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Network("demo backend unreachable".into()));
        }
        let response = self.route(&request);
        tracing::debug!(method = %request.method, path = %request.path, status = response.status, "Demo request served");
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn str_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn ok(body: impl serde::Serialize) -> HttpResponse {
    match serde_json::to_value(body) {
        Ok(body) => HttpResponse::ok(body),
        Err(e) => error(500, &e.to_string()),
    }
}

fn error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::new(status, json!({ "message": message }))
}

fn not_found(entity: &'static str, id: &str) -> HttpResponse {
    let err = CoreError::NotFound {
        entity,
        id: id.to_string(),
    };
    error(404, &err.to_string())
}

fn categories() -> Vec<ServiceCategory> {
    [
        ("installation", "Installation", "solar-panel"),
        ("maintenance", "Maintenance", "wrench"),
        ("consultation", "Consultation", "chat"),
    ]
    .into_iter()
    .map(|(id, name, icon)| ServiceCategory {
        id: id.into(),
        name: name.into(),
        icon: Some(icon.into()),
    })
    .collect()
}

fn catalog() -> Vec<Service> {
    [
        ("rooftop-3kw", "installation", "Rooftop Solar 3 kW", "Grid-tied rooftop system for small homes.", 180_000),
        ("rooftop-5kw", "installation", "Rooftop Solar 5 kW", "Grid-tied rooftop system for mid-size homes.", 285_000),
        ("panel-cleaning", "maintenance", "Panel Cleaning", "Professional cleaning of up to 20 panels.", 1_500),
        ("inverter-service", "maintenance", "Inverter Service", "Inspection and firmware update of your inverter.", 2_500),
        ("site-survey", "consultation", "Site Survey", "On-site assessment of roof and shading.", 0),
    ]
    .into_iter()
    .map(|(id, category, name, description, price)| Service {
        id: id.into(),
        category_id: category.into(),
        name: name.into(),
        description: description.into(),
        starting_price: Some(price),
        image_url: None,
    })
    .collect()
}

fn filter_services(category: Option<&str>) -> Vec<Service> {
    catalog()
        .into_iter()
        .filter(|s| category.map_or(true, |c| s.category_id == c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, path: &str, body: Option<Value>, token: Option<&str>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            url: format!("http://demo{path}"),
            path: path.to_string(),
            query: vec![],
            headers,
            body,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn wrong_otp_is_rejected() {
        let demo = DemoTransport::default();
        let resp = demo
            .send(request(Method::Post, "/auth/verify-otp", Some(json!({"phone": "1234567890", "otp": "000000"})), None))
            .await
            .unwrap();
        assert_eq!(resp.status, 400);
        assert_eq!(demo.call_count(), 1);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let demo = DemoTransport::default();
        let resp = demo.send(request(Method::Get, "/leads", None, None)).await.unwrap();
        assert_eq!(resp.status, 401);
        let resp = demo.send(request(Method::Get, "/leads", None, Some("forged"))).await.unwrap();
        assert_eq!(resp.status, 401);
    }

    #[tokio::test]
    async fn catalog_filters_by_category() {
        let demo = DemoTransport::default();
        let mut req = request(Method::Get, "/services", None, None);
        req.query.push(("category".into(), "maintenance".into()));
        let resp = demo.send(req).await.unwrap();
        let services: Vec<Service> = serde_json::from_value(resp.body).unwrap();
        assert_eq!(services.len(), 2);
        assert!(services.iter().all(|s| s.category_id == "maintenance"));
    }

    #[tokio::test]
    async fn offline_switch_fails_every_request() {
        let demo = DemoTransport::default();
        let shared = demo.clone();
        shared.set_offline(true);
        let err = demo.send(request(Method::Get, "/services", None, None)).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));

        shared.set_offline(false);
        let resp = demo.send(request(Method::Get, "/services", None, None)).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let demo = DemoTransport::default();
        let resp = demo.send(request(Method::Get, "/services/nope", None, None)).await.unwrap();
        assert_eq!(resp.status, 404);
    }
}
