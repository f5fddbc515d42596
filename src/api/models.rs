//! Request/response shapes of the prediction service.
//!
//! The service speaks plain JSON. Responses are decoded from a
//! `serde_json::Value` first so that a missing or mistyped field can be
//! reported as a contract violation instead of a transport error.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api::client::FetchError;

pub const PREDICT_ENDPOINT: &str = "/predict";
pub const CHAT_ENDPOINT: &str = "/chat";
pub const DATA_ENDPOINT: &str = "/data";

/// Numeric quarterback season line sent to `/predict`.
///
/// Every field is a plain struct member, so a serialized `StatLine` always
/// carries all twelve keys. Non-finite values serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StatLine {
    pub wins: f64,
    pub passing_yards: f64,
    pub passing_tds: f64,
    pub interceptions: f64,
    pub passer_rating: f64,
    pub qbr_total: f64,
    pub epa_total: f64,
    pub epa_per_play: f64,
    pub qb_plays: f64,
    pub sacks: f64,
    pub rushing_yards: f64,
    pub rushing_tds: f64,
}

impl StatLine {
    pub fn has_non_finite(&self) -> bool {
        [
            self.wins,
            self.passing_yards,
            self.passing_tds,
            self.interceptions,
            self.passer_rating,
            self.qbr_total,
            self.epa_total,
            self.epa_per_play,
            self.qb_plays,
            self.sacks,
            self.rushing_yards,
            self.rushing_tds,
        ]
        .iter()
        .any(|v| !v.is_finite())
    }
}

/// Decoded `/predict` response. Only constructed once `mvp` has been found.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictResponse {
    pub mvp: bool,
    pub probability: Option<f64>,
    pub explanation: Option<Value>,
}

impl PredictResponse {
    pub fn from_value(value: Value) -> Result<Self, FetchError> {
        let mvp = match value.get("mvp") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            _ => {
                return Err(FetchError::ContractViolation {
                    endpoint: PREDICT_ENDPOINT,
                    field: "mvp",
                })
            }
        };

        let probability = match value.get("probability") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(p) if p.is_finite() && (0.0..=1.0).contains(&p) => Some(p),
                other => {
                    tracing::warn!(
                        probability = ?other,
                        "⚠️ Ignoring out-of-range probability"
                    );
                    None
                }
            },
            Some(other) => {
                tracing::warn!(probability = %other, "⚠️ Ignoring non-numeric probability");
                None
            }
        };

        let explanation = match value.get("explanation") {
            None | Some(Value::Null) => None,
            Some(payload) => Some(payload.clone()),
        };

        Ok(Self {
            mvp,
            probability,
            explanation,
        })
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_data: Option<StatLine>,
}

/// Decoded `/chat` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    /// Raw `type` value as declared by the service.
    pub kind: Option<String>,
}

impl ChatResponse {
    pub fn from_value(value: Value) -> Result<Self, FetchError> {
        let response = match value.get("response") {
            Some(Value::String(text)) => text.clone(),
            _ => {
                return Err(FetchError::ContractViolation {
                    endpoint: CHAT_ENDPOINT,
                    field: "response",
                })
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        Ok(Self { response, kind })
    }
}

/// One player-season row from `GET /data`.
///
/// Rows are read loosely: stats may be `null` (QBR before 2006, for one),
/// whole-number fields may arrive as floats, and `mvp` may be `0/1` or a bool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalRecord {
    #[serde(deserialize_with = "whole_i32")]
    pub season: i32,
    pub name_first: String,
    pub name_last: String,
    pub team: String,
    #[serde(deserialize_with = "optional_count")]
    pub wins: Option<u32>,
    #[serde(deserialize_with = "optional_count")]
    pub losses: Option<u32>,
    pub passing_yards: Option<f64>,
    pub passing_tds: Option<f64>,
    pub interceptions: Option<f64>,
    pub rushing_yards: Option<f64>,
    pub rushing_tds: Option<f64>,
    pub passer_rating: Option<f64>,
    pub qbr_total: Option<f64>,
    pub epa_total: Option<f64>,
    pub qb_plays: Option<f64>,
    pub epa_per_play: Option<f64>,
    pub sacks: Option<f64>,
    #[serde(deserialize_with = "flag")]
    pub mvp: bool,
}

impl HistoricalRecord {
    /// Decodes a `/data` body, skipping rows that cannot be read.
    pub fn rows_from_value(value: Value) -> Result<Vec<Self>, FetchError> {
        let Value::Array(rows) = value else {
            return Err(FetchError::ContractViolation {
                endpoint: DATA_ENDPOINT,
                field: "records",
            });
        };

        let total = rows.len();
        let records: Vec<Self> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(index, row)| match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(row = index, "⚠️ Skipping unreadable historical row: {}", e);
                    None
                }
            })
            .collect();

        if records.len() < total {
            tracing::debug!("📄 Kept {} of {} historical rows", records.len(), total);
        }
        Ok(records)
    }

    pub fn is_mvp(&self) -> bool {
        self.mvp
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name_first, self.name_last)
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

fn whole_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    whole_number(&value)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a whole number, got {}", value)))
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    whole_number(&value)
        .and_then(|n| u32::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("expected a count, got {}", value)))
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::Null => Ok(false),
        other => Err(de::Error::custom(format!("expected 0/1 or a bool, got {}", other))),
    }
}
