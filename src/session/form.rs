//! 予測フォームコントローラ
//!
//! 12項目の生テキストを保持し、送信時に数値へ変換して/predictへ送る。
//! 成功時は予測ストアを置き換え、失敗時は表示状態だけを更新する。

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::models::{InputFields, PredictionResult, PredictionStatus, StatField};
use super::prediction_store::PredictionStore;
use super::state_broadcaster::{StateBroadcaster, StateChange};
use crate::api::PredictionApi;
use crate::error::AssistantResult;

/// 送信時の入力検証ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// 空欄・非数値があれば送信しない
    #[default]
    Strict,
    /// そのまま送信する（読めない値はNaN → JSONではnull）
    Permissive,
}

/// submit()の結果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// 予測を受け取りストアを置き換えた
    Stored(PredictionResult),
    /// 厳格モードで送信を止めた（通信なし）
    Rejected {
        missing: Vec<StatField>,
        invalid: Vec<StatField>,
    },
    /// 応答にmvpが無かった
    Unavailable,
    /// 通信に失敗した
    Failed,
    /// 前回の送信がまだ完了していない
    Busy,
    /// セッション終了により破棄した
    Cancelled,
}

#[derive(Debug, Default)]
struct FormState {
    fields: InputFields,
    status: PredictionStatus,
    submitting: bool,
}

pub struct PredictionForm {
    api: Arc<dyn PredictionApi>,
    store: Arc<PredictionStore>,
    broadcaster: Arc<StateBroadcaster>,
    cancel: CancellationToken,
    policy: ValidationPolicy,
    state: Mutex<FormState>,
}

impl PredictionForm {
    pub fn new(
        api: Arc<dyn PredictionApi>,
        store: Arc<PredictionStore>,
        broadcaster: Arc<StateBroadcaster>,
        cancel: CancellationToken,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            api,
            store,
            broadcaster,
            cancel,
            policy,
            state: Mutex::new(FormState::default()),
        }
    }

    /// 1項目を上書き（検証はしない）
    pub fn set_field(&self, field: StatField, value: impl Into<String>) {
        self.state.lock().fields.set(field, value);
    }

    pub fn set_field_by_name(&self, name: &str, value: impl Into<String>) -> AssistantResult<()> {
        let field: StatField = name.parse()?;
        self.set_field(field, value);
        Ok(())
    }

    pub fn field(&self, field: StatField) -> String {
        self.state.lock().fields.get(field).to_string()
    }

    pub fn fields(&self) -> InputFields {
        self.state.lock().fields.clone()
    }

    /// 全項目がtrim後に空でなければtrue（数値かどうかは見ない）
    pub fn is_submittable(&self) -> bool {
        self.state.lock().fields.is_complete()
    }

    pub fn status(&self) -> PredictionStatus {
        self.state.lock().status.clone()
    }

    pub fn status_text(&self) -> String {
        self.state.lock().status.message()
    }

    pub fn is_submitting(&self) -> bool {
        self.state.lock().submitting
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// 予測を送信
    pub async fn submit(&self) -> SubmitOutcome {
        let stats = {
            let mut state = self.state.lock();

            if self.cancel.is_cancelled() {
                return SubmitOutcome::Cancelled;
            }
            if state.submitting {
                tracing::debug!("⏳ Submission ignored, previous prediction still pending");
                return SubmitOutcome::Busy;
            }

            let missing = state.fields.missing_fields();
            let invalid = state.fields.invalid_fields();

            let incomplete = !missing.is_empty() || !invalid.is_empty();
            if incomplete && self.policy == ValidationPolicy::Strict {
                tracing::info!(
                    missing = missing.len(),
                    invalid = invalid.len(),
                    "🚫 Submission blocked by strict validation"
                );
                state.status = PredictionStatus::Incomplete;
                drop(state);
                self.broadcaster
                    .broadcast(StateChange::PredictionStatusChanged(PredictionStatus::Incomplete));
                return SubmitOutcome::Rejected { missing, invalid };
            }

            let stats = state.fields.to_stat_line();
            if stats.has_non_finite() {
                tracing::warn!(
                    missing = ?missing,
                    invalid = ?invalid,
                    "⚠️ Submitting with non-numeric fields (sent as null)"
                );
            }

            state.submitting = true;
            stats
        };
        self.broadcaster.broadcast(StateChange::SubmittingChanged(true));

        tracing::info!("📤 Submitting prediction request");

        let submission = InFlightSubmission::new(self);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.api.predict(&stats) => Some(result),
        };
        submission.settle();

        let (outcome, status) = {
            let mut state = self.state.lock();
            state.submitting = false;

            let (outcome, status) = match response {
                None => {
                    tracing::info!("🛑 Prediction discarded, session closed");
                    (SubmitOutcome::Cancelled, None)
                }
                Some(Ok(response)) => {
                    let result = PredictionResult::from(response);
                    self.store.replace(stats, result.clone());
                    tracing::info!(
                        verdict = result.verdict,
                        probability = ?result.probability,
                        "✅ Prediction stored"
                    );
                    (
                        SubmitOutcome::Stored(result.clone()),
                        Some(PredictionStatus::Verdict(result)),
                    )
                }
                Some(Err(e)) if e.is_contract_violation() => {
                    tracing::warn!("⚠️ Prediction unavailable: {}", e);
                    (SubmitOutcome::Unavailable, Some(PredictionStatus::Unavailable))
                }
                Some(Err(e)) => {
                    tracing::warn!("❌ Prediction request failed: {}", e);
                    (SubmitOutcome::Failed, Some(PredictionStatus::Failed))
                }
            };

            if let Some(status) = &status {
                state.status = status.clone();
            }
            (outcome, status)
        };

        self.broadcaster.broadcast(StateChange::SubmittingChanged(false));
        if let SubmitOutcome::Stored(result) = &outcome {
            self.broadcaster.broadcast(StateChange::PredictionStored(result.clone()));
        }
        if let Some(status) = status {
            self.broadcaster.broadcast(StateChange::PredictionStatusChanged(status));
        }

        outcome
    }
}

/// 送信中の予測
///
/// submit()のFutureが途中で破棄された場合は送信中フラグだけを戻す。
/// 表示状態と予測ストアには触れない。
struct InFlightSubmission<'a> {
    form: &'a PredictionForm,
    armed: bool,
}

impl<'a> InFlightSubmission<'a> {
    fn new(form: &'a PredictionForm) -> Self {
        Self { form, armed: true }
    }

    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightSubmission<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.form.state.lock().submitting = false;
        tracing::info!("🛑 Prediction request dropped before the response arrived");
        self.form.broadcaster.broadcast(StateChange::SubmittingChanged(false));
    }
}
