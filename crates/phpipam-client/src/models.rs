//! phpIPAM API models
//!
//! Every phpIPAM response is wrapped in the same envelope:
//! `{code, success, data, message, time}`. Depending on the phpIPAM version
//! `success` is either a boolean or an integer, so it is decoded into
//! [`SuccessFlag`] and normalised by [`ApiResponse::is_success`].

use crate::error::IpamError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Encoded `success` flag of the envelope.
///
/// Strings, floats, null or a missing field fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuccessFlag {
    /// `true` / `false`
    Bool(bool),
    /// Integer flag where `0` means success
    Int(i64),
}

impl SuccessFlag {
    /// Normalised success value.
    pub fn is_success(self) -> bool {
        match self {
            SuccessFlag::Bool(b) => b,
            SuccessFlag::Int(i) => i == 0,
        }
    }
}

/// Response envelope returned by every phpIPAM endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP-like status code reported by phpIPAM
    #[serde(default)]
    pub code: i64,

    /// Success flag, see [`SuccessFlag`]
    pub success: SuccessFlag,

    /// Endpoint specific payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,

    /// Error or informational message
    #[serde(default)]
    pub message: Option<String>,

    /// Server side execution time
    #[serde(default)]
    pub time: Option<f64>,
}

impl ApiResponse {
    /// Decodes an envelope from a raw response body.
    pub fn from_body(body: &str) -> Result<Self, IpamError> {
        serde_json::from_str(body).map_err(|e| {
            IpamError::Decode(format!(
                "invalid phpIPAM envelope: {} - Response (first 500 chars): {}",
                e,
                body.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Whether phpIPAM reported success.
    pub fn is_success(&self) -> bool {
        self.success.is_success()
    }

    /// Message of the envelope, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// Whether the envelope reports a missing object.
    pub fn is_not_found(&self) -> bool {
        !self.is_success() && (self.code == 404 || self.message().to_lowercase().contains("not found"))
    }

    /// Whether the envelope reports a rejected or expired token.
    pub fn is_auth_failure(&self) -> bool {
        !self.is_success() && (self.code == 401 || self.code == 403)
    }

    /// Converts a non-success envelope into an error, keeping the payload otherwise.
    pub fn into_result(self) -> Result<Option<serde_json::Value>, IpamError> {
        if self.is_success() {
            return Ok(self.data);
        }
        if self.is_not_found() {
            return Err(IpamError::NotFound(self.message().to_string()));
        }
        Err(IpamError::Api {
            code: self.code,
            message: self.message().to_string(),
        })
    }

    /// Converts the envelope into a typed payload.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, IpamError> {
        let data = self
            .into_result()?
            .ok_or_else(|| IpamError::Decode("response has no data".to_string()))?;
        serde_json::from_value(data.clone()).map_err(|e| {
            IpamError::Decode(format!("unexpected data {}: {}", data, e))
        })
    }
}

/// `data` of the token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    /// Token to send in the `token` header
    pub token: String,

    /// Expiry as reported by phpIPAM
    #[serde(default)]
    pub expires: Option<String>,
}

/// Subnet as returned by `GET /subnets/{id}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    /// Subnet ID
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Network address (e.g. `10.1.2.0`)
    pub subnet: String,

    /// Prefix length (e.g. `24`)
    #[serde(deserialize_with = "string_or_number")]
    pub mask: String,

    /// Gateway record, if one is configured
    #[serde(default)]
    pub gateway: Option<SubnetGateway>,
}

/// Gateway of a subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetGateway {
    /// Gateway address
    pub ip_addr: String,
}

/// Address record as returned by the address search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// Address ID
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Subnet the address belongs to
    #[serde(rename = "subnetId", deserialize_with = "string_or_number")]
    pub subnet_id: String,

    /// The address itself
    #[serde(default)]
    pub ip: Option<String>,

    /// Owner tag set at reservation time
    #[serde(default)]
    pub owner: Option<String>,
}

/// Subnet metadata for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetInfo {
    /// Network address
    pub subnet: String,
    /// Prefix length
    pub mask: String,
    /// Gateway address
    pub gateway: String,
}

/// phpIPAM returns IDs as strings on most versions and as numbers on some.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flag_bool_and_int() {
        let ok = ApiResponse::from_body(r#"{"code":200,"success":true,"data":"10.1.2.3"}"#).unwrap();
        assert!(ok.is_success());

        let int_ok = ApiResponse::from_body(r#"{"code":200,"success":0,"data":"10.1.2.3"}"#).unwrap();
        assert!(int_ok.is_success());

        let int_fail = ApiResponse::from_body(r#"{"code":409,"success":1,"message":"No free addresses"}"#).unwrap();
        assert!(!int_fail.is_success());
    }

    #[test]
    fn test_success_flag_rejects_other_encodings() {
        assert!(matches!(
            ApiResponse::from_body(r#"{"code":200,"success":"true"}"#),
            Err(IpamError::Decode(_))
        ));
        assert!(matches!(
            ApiResponse::from_body(r#"{"code":200,"success":null}"#),
            Err(IpamError::Decode(_))
        ));
        assert!(matches!(ApiResponse::from_body(r#"{"code":200}"#), Err(IpamError::Decode(_))));
    }

    #[test]
    fn test_not_found_envelope_maps_to_not_found() {
        let resp = ApiResponse::from_body(
            r#"{"code":200,"success":false,"message":"Address not found","time":0.003}"#,
        )
        .unwrap();
        assert!(resp.is_not_found());
        assert!(matches!(resp.into_result(), Err(IpamError::NotFound(_))));
    }

    #[test]
    fn test_subnet_decodes_numeric_ids_and_gateway() {
        let resp = ApiResponse::from_body(
            r#"{"code":200,"success":true,"data":{"id":8,"subnet":"10.1.8.0","mask":"24","gateway":{"ip_addr":"10.1.8.1","id":"77"}}}"#,
        )
        .unwrap();
        let subnet: Subnet = resp.into_data().unwrap();
        assert_eq!(subnet.id, "8");
        assert_eq!(subnet.mask, "24");
        assert_eq!(subnet.gateway.unwrap().ip_addr, "10.1.8.1");
    }

    #[test]
    fn test_address_search_result() {
        let resp = ApiResponse::from_body(
            r#"{"code":200,"success":true,"data":[{"id":"42","subnetId":"8","ip":"10.1.8.5","owner":"node-a"}]}"#,
        )
        .unwrap();
        let addresses: Vec<Address> = resp.into_data().unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].subnet_id, "8");
        assert_eq!(addresses[0].owner.as_deref(), Some("node-a"));
    }
}
