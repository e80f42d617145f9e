//! Endpoint paths, request forms and response decoding for the Popin REST API.
//!
//! Everything here is runtime-agnostic: requests are built as
//! [`HttpRequest`] values and responses are decoded from [`HttpResponse`]
//! bodies. Executing them is left to an [`HttpClient`](crate::net::HttpClient).

use crate::contact::ContactInfo;
use crate::error::ApiError;
use crate::net::{HttpRequest, HttpResponse};
use crate::types::{CallId, CallQueueId, ConnectionUpdate, StatusUpdate};
use log::debug;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

pub const DEFAULT_BASE_URL: &str = "https://dev.popin.to/api/v1";
pub const DEFAULT_DEVICE: &str = "iosSdk";

pub const REGISTER_PATH: &str = "/website/user/login";
pub const CONNECT_PATH: &str = "/user/connect";
pub const CONNECT_UPDATE_PATH: &str = "/user/connect/update";
pub const PUSH_TOKEN_PATH: &str = "/seller/fcm/update";
pub const CALL_TOKEN_PATH: &str = "/user/call";
pub const END_CALL_PATH: &str = "/user/call/end";

/// `status` value the API uses for a successful call.
pub const STATUS_OK: i64 = 1;

pub fn call_details_path(call_id: CallId) -> String {
    format!("/user/call/{call_id}")
}

/// Joins a base URL and an absolute endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Parameters for `/website/user/login`.
#[derive(Debug, Clone)]
pub struct RegisterUser<'a> {
    pub seller_id: i64,
    pub name: &'a str,
    pub contact: &'a ContactInfo,
    pub campaign: &'a BTreeMap<String, String>,
    pub device: &'a str,
}

impl RegisterUser<'_> {
    pub fn form(&self) -> Result<Vec<(&'static str, String)>, ApiError> {
        let mut fields = vec![
            ("seller_id", self.seller_id.to_string()),
            (
                "is_mobile",
                if self.contact.is_mobile() { "1" } else { "0" }.to_string(),
            ),
            ("device", self.device.to_string()),
            ("name", self.name.to_string()),
            (self.contact.field_name(), self.contact.value().to_string()),
        ];
        if !self.campaign.is_empty() {
            fields.push(("campaign", serde_json::to_string(self.campaign)?));
        }
        Ok(fields)
    }
}

/// Form for `/user/connect` and `/user/call`.
pub fn seller_form(seller_id: i64) -> Vec<(&'static str, String)> {
    vec![("seller_id", seller_id.to_string())]
}

pub fn connect_update_form(call_queue_id: CallQueueId) -> Vec<(&'static str, String)> {
    vec![("call_queue_id", call_queue_id.to_string())]
}

pub fn end_call_form(call_id: CallId) -> Vec<(&'static str, String)> {
    vec![("call_id", call_id.to_string())]
}

pub fn push_token_form(token: &str) -> Vec<(&'static str, String)> {
    vec![("push_token", token.to_string())]
}

/// Builds the poll request for one call queue entry.
pub fn connect_update_request(base_url: &str, call_queue_id: CallQueueId) -> HttpRequest {
    HttpRequest::post(endpoint(base_url, CONNECT_UPDATE_PATH))
        .with_form(&connect_update_form(call_queue_id))
}

/// Rejects non-2xx responses and decodes the JSON body.
pub fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    if !response.is_success() {
        debug!(
            target: "Popin/Http",
            "HTTP {} body: {}",
            response.status_code,
            response.body_string()
        );
        return Err(ApiError::Http(response.status_code));
    }
    Ok(serde_json::from_slice(&response.body)?)
}

pub fn decode_status_update(response: &HttpResponse) -> Result<StatusUpdate, ApiError> {
    let raw: ConnectionUpdate = decode_json(response)?;
    StatusUpdate::try_from(raw.clone()).map_err(|e| {
        debug!(target: "Popin/Http", "Unusable connection update {raw:?}: {e}");
        ApiError::Status(e)
    })
}
