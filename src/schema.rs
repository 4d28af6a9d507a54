//! Traveller extraction schema types.
//!
//! These are both the shape the completion service is asked to produce and the
//! body returned by `POST /api/process-travellers`.

use serde::{Deserialize, Serialize};

/// Maximum number of travellers a single extraction may return.
pub const MAX_TRAVELLERS: usize = 5;

/// Name of the response format sent with the completion request.
pub const SCHEMA_NAME: &str = "traveller_information";

/// Structured result of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub travellers: Vec<ExtractedTraveller>,
    #[serde(default)]
    pub global_info: GlobalInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTraveller {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub nationality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disability: Option<String>,
}

/// Document-wide facts applied to any traveller missing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disability: Option<String>,
}

impl ExtractionResult {
    /// Drop travellers beyond [`MAX_TRAVELLERS`]. Returns how many were dropped.
    pub fn cap_travellers(&mut self) -> usize {
        let extra = self.travellers.len().saturating_sub(MAX_TRAVELLERS);
        self.travellers.truncate(MAX_TRAVELLERS);
        extra
    }
}

/// Strict JSON schema for the completion service's `response_format`.
///
/// Strict mode requires every property to be listed as required, so optional
/// fields are expressed as nullable instead.
pub fn response_schema() -> serde_json::Value {
    let nullable_string = serde_json::json!({ "type": ["string", "null"] });

    serde_json::json!({
        "type": "object",
        "properties": {
            "travellers": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "firstName": { "type": "string" },
                        "lastName": { "type": "string" },
                        "dateOfBirth": { "type": "string" },
                        "gender": { "type": "string" },
                        "nationality": { "type": "string" },
                        "disability": nullable_string
                    },
                    "required": ["firstName", "lastName", "dateOfBirth", "gender", "nationality", "disability"],
                    "additionalProperties": false
                }
            },
            "globalInfo": {
                "type": "object",
                "properties": {
                    "nationality": nullable_string,
                    "disability": nullable_string
                },
                "required": ["nationality", "disability"],
                "additionalProperties": false
            }
        },
        "required": ["travellers", "globalInfo"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_model_output_with_nulls() {
        let raw = r#"{
            "travellers": [
                {"firstName": "Anna", "lastName": "Berg", "dateOfBirth": "19850311",
                 "gender": "female", "nationality": "Swedish", "disability": null}
            ],
            "globalInfo": {"nationality": "Swedish", "disability": null}
        }"#;
        let result: ExtractionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.travellers.len(), 1);
        assert_eq!(result.travellers[0].first_name, "Anna");
        assert_eq!(result.travellers[0].disability, None);
        assert_eq!(result.global_info.nationality.as_deref(), Some("Swedish"));
    }

    #[test]
    fn test_serializes_camel_case_and_omits_missing_optionals() {
        let result = ExtractionResult {
            travellers: vec![ExtractedTraveller {
                first_name: "Erik".into(),
                last_name: "Lund".into(),
                date_of_birth: "19700101".into(),
                gender: "male".into(),
                nationality: "Norwegian".into(),
                disability: None,
            }],
            global_info: GlobalInfo::default(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["travellers"][0]["firstName"], "Erik");
        assert_eq!(value["travellers"][0]["dateOfBirth"], "19700101");
        assert!(value["travellers"][0].get("disability").is_none());
        assert_eq!(value["globalInfo"], serde_json::json!({}));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let raw = r#"{"travellers": [{"firstName": "Anna"}], "globalInfo": {}}"#;
        assert!(serde_json::from_str::<ExtractionResult>(raw).is_err());
    }

    #[test]
    fn test_cap_travellers() {
        let mut result = ExtractionResult {
            travellers: vec![ExtractedTraveller::default(); 7],
            global_info: GlobalInfo::default(),
        };
        assert_eq!(result.cap_travellers(), 2);
        assert_eq!(result.travellers.len(), MAX_TRAVELLERS);
        assert_eq!(result.cap_travellers(), 0);
    }

    #[test]
    fn test_response_schema_is_strict() {
        let schema = response_schema();
        assert_eq!(schema["additionalProperties"], false);
        let required = schema["properties"]["travellers"]["items"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 6);
    }
}
