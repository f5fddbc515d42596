//! 予測結果ストア
//!
//! 置き換えのみ。部分更新やクリアは提供しない。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::models::PredictionResult;
use crate::api::models::StatLine;

/// 成功した予測1回分（送信した数値と結果）
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSnapshot {
    pub inputs: StatLine,
    pub result: PredictionResult,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PredictionStore {
    latest: RwLock<Option<Arc<PredictionSnapshot>>>,
}

impl PredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直前の結果を丸ごと置き換える
    pub fn replace(&self, inputs: StatLine, result: PredictionResult) -> Arc<PredictionSnapshot> {
        let snapshot = Arc::new(PredictionSnapshot {
            inputs,
            result,
            stored_at: Utc::now(),
        });
        *self.latest.write() = Some(Arc::clone(&snapshot));
        tracing::debug!(verdict = snapshot.result.verdict, "💾 Prediction snapshot replaced");
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<PredictionSnapshot>> {
        self.latest.read().clone()
    }

    pub fn result(&self) -> Option<PredictionResult> {
        self.latest.read().as_ref().map(|s| s.result.clone())
    }

    /// チャットへ添付するコンテキスト（最後に送信した数値）
    pub fn context(&self) -> Option<StatLine> {
        self.latest.read().as_ref().map(|s| s.inputs)
    }

    pub fn has_prediction(&self) -> bool {
        self.latest.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(verdict: bool) -> PredictionResult {
        PredictionResult {
            verdict,
            probability: None,
            explanation: None,
        }
    }

    #[test]
    fn test_empty_store() {
        let store = PredictionStore::new();
        assert!(!store.has_prediction());
        assert!(store.latest().is_none());
        assert!(store.context().is_none());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = PredictionStore::new();
        let first_inputs = StatLine {
            wins: 10.0,
            ..StatLine::default()
        };
        store.replace(first_inputs, result(false));

        let earlier = store.latest().unwrap();

        let second_inputs = StatLine {
            wins: 14.0,
            ..StatLine::default()
        };
        store.replace(second_inputs, result(true));

        assert_eq!(store.context().unwrap().wins, 14.0);
        assert!(store.result().unwrap().verdict);
        // 以前に取得したスナップショットは変化しない
        assert_eq!(earlier.inputs.wins, 10.0);
        assert!(!earlier.result.verdict);
    }
}
