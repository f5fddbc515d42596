use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::{PredictResponse, StatLine};
use crate::error::AssistantError;

/// 起動時に表示するアシスタントの挨拶
pub const WELCOME_MESSAGE: &str = "Hi! I'm your NFL MVP prediction assistant. I'll compare your stats to Josh Allen's 2024 MVP season. Make a prediction first, then ask me questions like 'How can I improve?' or 'Why is the prediction low?'";

/// 通信失敗時にチャットへ追加する定型文
pub const CHAT_ERROR_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// クイックアクション（ワンクリック質問）
pub const QUICK_ACTIONS: [&str; 4] = [
    "How can I improve?",
    "Why is my prediction low?",
    "Compare to Josh Allen",
    "What makes a good MVP?",
];

/// 入力フォームの12項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatField {
    Wins,
    PassingYards,
    PassingTds,
    Interceptions,
    PasserRating,
    QbrTotal,
    EpaTotal,
    EpaPerPlay,
    QbPlays,
    Sacks,
    RushingYards,
    RushingTds,
}

impl StatField {
    pub const ALL: [StatField; 12] = [
        StatField::Wins,
        StatField::PassingYards,
        StatField::PassingTds,
        StatField::Interceptions,
        StatField::PasserRating,
        StatField::QbrTotal,
        StatField::EpaTotal,
        StatField::EpaPerPlay,
        StatField::QbPlays,
        StatField::Sacks,
        StatField::RushingYards,
        StatField::RushingTds,
    ];

    /// ワイヤ上のキー名
    pub fn key(&self) -> &'static str {
        match self {
            StatField::Wins => "wins",
            StatField::PassingYards => "passing_yards",
            StatField::PassingTds => "passing_tds",
            StatField::Interceptions => "interceptions",
            StatField::PasserRating => "passer_rating",
            StatField::QbrTotal => "qbr_total",
            StatField::EpaTotal => "epa_total",
            StatField::EpaPerPlay => "epa_per_play",
            StatField::QbPlays => "qb_plays",
            StatField::Sacks => "sacks",
            StatField::RushingYards => "rushing_yards",
            StatField::RushingTds => "rushing_tds",
        }
    }

    /// 表示用ラベル（"passing_yards" -> "Passing Yards"）
    pub fn label(&self) -> String {
        self.key()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn description(&self) -> &'static str {
        match self {
            StatField::Wins => "Number of games won by the team",
            StatField::PassingYards => "Total passing yards in the season",
            StatField::PassingTds => "Total passing touchdowns thrown",
            StatField::Interceptions => "Total interceptions thrown",
            StatField::PasserRating => "NFL passer rating (0-158.3)",
            StatField::QbrTotal => "Total Quarterback Rating (0-100)",
            StatField::EpaTotal => "Expected Points Added total for the season",
            StatField::EpaPerPlay => "Expected Points Added per play",
            StatField::QbPlays => "Total number of QB plays (dropbacks)",
            StatField::Sacks => "Number of times sacked",
            StatField::RushingYards => "Total rushing yards by the QB",
            StatField::RushingTds => "Total rushing touchdowns by the QB",
        }
    }

    pub fn example(&self) -> &'static str {
        match self {
            StatField::Wins => "13",
            StatField::PassingYards => "4306",
            StatField::PassingTds => "28",
            StatField::Interceptions => "6",
            StatField::PasserRating => "99.6",
            StatField::QbrTotal => "68.2",
            StatField::EpaTotal => "85.4",
            StatField::EpaPerPlay => "0.142",
            StatField::QbPlays => "601",
            StatField::Sacks => "23",
            StatField::RushingYards => "523",
            StatField::RushingTds => "15",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StatField {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StatField::ALL
            .iter()
            .copied()
            .find(|field| field.key() == wanted)
            .ok_or_else(|| AssistantError::UnknownField(wanted.to_string()))
    }
}

/// 入力途中の生テキスト（12項目すべて常に存在する）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFields {
    values: [String; 12],
}

impl InputFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: StatField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: StatField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatField, &str)> {
        StatField::ALL
            .iter()
            .map(move |field| (*field, self.get(*field)))
    }

    /// 空欄（trim後）の項目
    pub fn missing_fields(&self) -> Vec<StatField> {
        self.iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
            .collect()
    }

    /// 入力済みだが有限の数値として読めない項目
    pub fn invalid_fields(&self) -> Vec<StatField> {
        self.iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .filter(|(_, value)| !parse_stat(value).is_finite())
            .map(|(field, _)| field)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// 数値ペイロードへ変換。読めない値はNaNになる
    pub fn to_stat_line(&self) -> StatLine {
        let value = |field: StatField| parse_stat(self.get(field));
        StatLine {
            wins: value(StatField::Wins),
            passing_yards: value(StatField::PassingYards),
            passing_tds: value(StatField::PassingTds),
            interceptions: value(StatField::Interceptions),
            passer_rating: value(StatField::PasserRating),
            qbr_total: value(StatField::QbrTotal),
            epa_total: value(StatField::EpaTotal),
            epa_per_play: value(StatField::EpaPerPlay),
            qb_plays: value(StatField::QbPlays),
            sacks: value(StatField::Sacks),
            rushing_yards: value(StatField::RushingYards),
            rushing_tds: value(StatField::RushingTds),
        }
    }
}

pub fn parse_stat(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// 予測結果。成功した/predictからのみ生成され、以後は不変
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub verdict: bool,
    pub probability: Option<f64>,
    /// スキーマ未定義のまま受け渡すだけのペイロード
    pub explanation: Option<Value>,
}

impl PredictionResult {
    pub fn verdict_text(&self) -> String {
        let base = if self.verdict {
            "That is high enough and they would likely win MVP."
        } else {
            "That is not high enough and they would likely not win MVP."
        };

        match self.confidence_text() {
            Some(confidence) => format!("{} (Confidence: {})", base, confidence),
            None => base.to_string(),
        }
    }

    /// "84.2%" 形式
    pub fn confidence_text(&self) -> Option<String> {
        self.probability.map(|p| format!("{:.1}%", p * 100.0))
    }
}

impl From<PredictResponse> for PredictionResult {
    fn from(response: PredictResponse) -> Self {
        Self {
            verdict: response.mvp,
            probability: response.probability,
            explanation: response.explanation,
        }
    }
}

/// 予測欄に表示する状態
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PredictionStatus {
    #[default]
    AwaitingInput,
    /// 厳格モードで未入力/不正値があり送信を止めた
    Incomplete,
    Verdict(PredictionResult),
    /// 応答にmvpが無かった
    Unavailable,
    /// 通信失敗
    Failed,
}

impl PredictionStatus {
    pub fn message(&self) -> String {
        match self {
            PredictionStatus::AwaitingInput => "Input values for a prediction!".to_string(),
            PredictionStatus::Incomplete => "Please complete all fields.".to_string(),
            PredictionStatus::Verdict(result) => result.verdict_text(),
            PredictionStatus::Unavailable => "Prediction unavailable.".to_string(),
            PredictionStatus::Failed => "Error making prediction.".to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Unavailable | PredictionStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Improvement,
    Explanation,
    Comparison,
    General,
    Error,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Improvement => "improvement",
            MessageCategory::Explanation => "explanation",
            MessageCategory::Comparison => "comparison",
            MessageCategory::General => "general",
            MessageCategory::Error => "error",
        }
    }

    /// サービスが宣言したtypeを解釈。未指定・未知の値はGeneral
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared.map(str::trim) {
            Some("improvement") => MessageCategory::Improvement,
            Some("explanation") => MessageCategory::Explanation,
            Some("comparison") => MessageCategory::Comparison,
            Some("error") => MessageCategory::Error,
            Some("general") | None => MessageCategory::General,
            Some(other) => {
                tracing::debug!("🏷️ Unknown message type '{}', using general", other);
                MessageCategory::General
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// セッション単位の単調増加IDジェネレータ
#[derive(Debug)]
pub struct MessageIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> MessageId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        MessageId(format!("{}-{}", self.prefix, seq))
    }
}

/// チャットログの1件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub category: Option<MessageCategory>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender: Sender::User,
            category: None,
            timestamp: Utc::now(),
        }
    }

    pub fn bot(id: MessageId, text: impl Into<String>, category: MessageCategory) -> Self {
        Self {
            id,
            text: text.into(),
            sender: Sender::Bot,
            category: Some(category),
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.category == Some(MessageCategory::Error)
    }

    /// "HH:MM" 表示用
    pub fn display_time(&self) -> String {
        self.timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    }
}
