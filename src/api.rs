pub mod client; // 予測サービスHTTPクライアント
pub mod models; // リクエスト/レスポンス型

pub use client::{FetchError, HttpPredictionClient, PredictionApi};
pub use models::{ChatRequest, ChatResponse, HistoricalRecord, PredictResponse, StatLine};
