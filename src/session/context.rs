//! セッション単位の状態ストア
//!
//! フォーム・予測ストア・チャット・ブロードキャスターを1つにまとめる。
//! グローバル状態は持たないので、テストではセッションを個別に作れる。

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::chat::ChatSession;
use super::form::{PredictionForm, ValidationPolicy};
use super::prediction_store::PredictionStore;
use super::state_broadcaster::{StateBroadcaster, StateChange};
use crate::api::PredictionApi;

pub struct AssistantSession {
    id: Uuid,
    api: Arc<dyn PredictionApi>,
    store: Arc<PredictionStore>,
    broadcaster: Arc<StateBroadcaster>,
    cancel: CancellationToken,
    form: PredictionForm,
    chat: ChatSession,
}

impl AssistantSession {
    pub fn new(api: Arc<dyn PredictionApi>, policy: ValidationPolicy) -> Self {
        let id = Uuid::new_v4();
        let store = Arc::new(PredictionStore::new());
        let broadcaster = Arc::new(StateBroadcaster::new());
        let cancel = CancellationToken::new();

        let form = PredictionForm::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            cancel.child_token(),
            policy,
        );

        // メッセージIDの接頭辞はセッションIDの先頭8文字
        let prefix: String = id.simple().to_string().chars().take(8).collect();
        let chat = ChatSession::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            cancel.child_token(),
            prefix,
        );

        tracing::info!(session_id = %id, policy = ?policy, "🏗️ Assistant session created");

        Self {
            id,
            api,
            store,
            broadcaster,
            cancel,
            form,
            chat,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn form(&self) -> &PredictionForm {
        &self.form
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn predictions(&self) -> &Arc<PredictionStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn PredictionApi> {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.broadcaster.subscribe()
    }

    /// 応答待ちの通信を破棄し、以後の送信を拒否する
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(session_id = %self.id, "🛑 Assistant session shutting down");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for AssistantSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
