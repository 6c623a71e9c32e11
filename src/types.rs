//! Wire types for the directory service: user payloads, the batch envelope,
//! and the `Profile` value object derived from them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved directory profile.
///
/// Immutable once constructed. Identity is the pair `(id, email)`; both are
/// valid lookup keys for the same logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque identifier assigned by the service.
    pub id: String,
    /// Display name, when set on the account.
    pub display_name: Option<String>,
    /// Job title.
    pub job_title: Option<String>,
    /// Department name.
    pub department: Option<String>,
    /// Primary email address; also a lookup key when present.
    pub email: Option<String>,
    /// Office location string.
    pub office_location: Option<String>,
    /// City.
    pub city: Option<String>,
    /// First listed business phone number.
    pub business_phone: Option<String>,
    /// First listed instant-messaging address.
    pub im_address: Option<String>,
    /// Company name.
    pub company_name: Option<String>,
}

/// Raw user record as returned by the service.
///
/// Every field except `id` is optional on the wire; absent fields simply stay
/// `None` rather than failing the decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub office_location: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub business_phones: Vec<String>,
    #[serde(default)]
    pub im_addresses: Vec<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    /// Present only on collection queries that select it; `Some(false)`
    /// marks a disabled account.
    #[serde(default)]
    pub account_enabled: Option<bool>,
}

impl From<UserPayload> for Profile {
    fn from(payload: UserPayload) -> Self {
        Profile {
            id: payload.id,
            display_name: payload.display_name,
            job_title: payload.job_title,
            department: payload.department,
            email: payload.mail,
            office_location: payload.office_location,
            city: payload.city,
            business_phone: payload.business_phones.into_iter().next(),
            im_address: payload.im_addresses.into_iter().next(),
            company_name: payload.company_name,
        }
    }
}

/// Collection wrapper used by list endpoints such as direct reports.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPayload {
    #[serde(default)]
    pub value: Vec<UserPayload>,
}

/// One logical request folded into a batch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestItem {
    /// Request id, unique within the pending queue's lifetime. Carried as a
    /// string on the wire.
    pub id: String,
    /// HTTP method of the logical request.
    pub method: String,
    /// Relative path, e.g. `/users/{key}?$select=...`.
    pub url: String,
}

/// Request body posted to the batch endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEnvelope {
    pub requests: Vec<BatchRequestItem>,
}

/// One settled entry from a batched response collection.
///
/// Entries may arrive in any order; dispatch is keyed by `id`, never by
/// array position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub id: String,
    /// HTTP status of the individual logical request.
    pub status: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

/// Response body returned by the batch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponseEnvelope {
    #[serde(default)]
    pub responses: Vec<BatchItemResponse>,
}
