//! チャットセッションマネージャ
//!
//! ターンごとの状態遷移: Idle → Composing → Sending → (Delivered | Failed) → Idle
//!
//! - 送信は同時に1件まで。応答待ちの間のsend()は何もしない
//! - ユーザーメッセージは通信前に即座に追加する（失敗しても残る）
//! - 通信失敗は定型のエラーメッセージとして追加し、セッションは継続する
//! - ログは追記のみ。削除・並べ替えはしない

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::models::{
    Message, MessageCategory, MessageIdGenerator, CHAT_ERROR_TEXT, QUICK_ACTIONS, WELCOME_MESSAGE,
};
use super::prediction_store::PredictionStore;
use super::state_broadcaster::{StateBroadcaster, StateChange};
use crate::api::models::ChatRequest;
use crate::api::PredictionApi;
use crate::utils::preview;

/// 現在のターンの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Composing,
    Sending,
}

/// 直近ターンの決着
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Delivered,
    Failed,
    /// セッション終了で中断（ボットメッセージは追加しない）
    Cancelled,
}

/// send()の結果
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered(Message),
    Failed(Message),
    /// 前のターンが応答待ち
    Busy,
    /// 入力が空（trim後）
    Empty,
    /// セッション終了後
    Closed,
    /// 応答待ちの間にセッションが終了した
    Cancelled,
}

#[derive(Debug)]
struct ChatState {
    messages: Vec<Message>,
    pending: String,
    awaiting: bool,
    last_settlement: Option<Settlement>,
}

pub struct ChatSession {
    api: Arc<dyn PredictionApi>,
    store: Arc<PredictionStore>,
    broadcaster: Arc<StateBroadcaster>,
    cancel: CancellationToken,
    ids: MessageIdGenerator,
    state: Mutex<ChatState>,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn PredictionApi>,
        store: Arc<PredictionStore>,
        broadcaster: Arc<StateBroadcaster>,
        cancel: CancellationToken,
        id_prefix: impl Into<String>,
    ) -> Self {
        let ids = MessageIdGenerator::new(id_prefix);
        let welcome = Message::bot(ids.next_id(), WELCOME_MESSAGE, MessageCategory::General);

        Self {
            api,
            store,
            broadcaster,
            cancel,
            ids,
            state: Mutex::new(ChatState {
                messages: vec![welcome],
                pending: String::new(),
                awaiting: false,
                last_settlement: None,
            }),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.state.lock().messages.last().cloned()
    }

    pub fn pending_input(&self) -> String {
        self.state.lock().pending.clone()
    }

    pub fn set_pending_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.lock().pending = text.clone();
        self.broadcaster.broadcast(StateChange::PendingInputChanged(text));
    }

    pub fn quick_actions(&self) -> &'static [&'static str] {
        &QUICK_ACTIONS
    }

    /// 予測が一度も無いうちはクイックアクションを出さない
    pub fn quick_actions_visible(&self) -> bool {
        self.store.has_prediction()
    }

    /// プリセットを入力欄へそのまま入れる（送信はしない）
    pub fn select_quick_action(&self, index: usize) -> Option<&'static str> {
        let action = QUICK_ACTIONS.get(index).copied()?;
        self.set_pending_input(action);
        Some(action)
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state.lock().awaiting
    }

    pub fn turn_state(&self) -> TurnState {
        let state = self.state.lock();
        if state.awaiting {
            TurnState::Sending
        } else if !state.pending.is_empty() {
            TurnState::Composing
        } else {
            TurnState::Idle
        }
    }

    pub fn last_settlement(&self) -> Option<Settlement> {
        self.state.lock().last_settlement
    }

    /// 入力中テキストを送信
    pub async fn send(&self) -> SendOutcome {
        let (text, user_message, count) = {
            let mut state = self.state.lock();

            if self.cancel.is_cancelled() {
                return SendOutcome::Closed;
            }
            if state.awaiting {
                tracing::debug!("⏳ Send ignored, awaiting previous response");
                return SendOutcome::Busy;
            }
            if state.pending.trim().is_empty() {
                return SendOutcome::Empty;
            }

            let text = std::mem::take(&mut state.pending);
            let message = Message::user(self.ids.next_id(), text.clone());
            state.messages.push(message.clone());
            state.awaiting = true;
            (text, message, state.messages.len())
        };

        self.broadcaster.broadcast(StateChange::MessageAppended {
            count,
            message: user_message,
        });
        self.broadcaster.broadcast(StateChange::PendingInputChanged(String::new()));
        self.broadcaster.broadcast(StateChange::AwaitingResponseChanged(true));

        let request = ChatRequest {
            message: text,
            prediction_data: self.store.context(),
        };

        tracing::debug!(
            message_len = request.message.len(),
            preview = %preview(&request.message),
            has_context = request.prediction_data.is_some(),
            "💬 Sending chat turn"
        );

        let turn = InFlightTurn::new(self);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.api.chat(&request) => Some(result),
        };
        turn.settle();

        let (outcome, appended) = {
            let mut state = self.state.lock();
            state.awaiting = false;

            match response {
                None => {
                    tracing::info!("🛑 Chat turn abandoned, session closed");
                    state.last_settlement = Some(Settlement::Cancelled);
                    (SendOutcome::Cancelled, None)
                }
                Some(result) => {
                    let (message, settlement) = match result {
                        Ok(response) => {
                            let category = MessageCategory::from_declared(response.kind.as_deref());
                            tracing::info!(
                                category = category.as_str(),
                                "✅ Chat response received"
                            );
                            (
                                Message::bot(self.ids.next_id(), response.response, category),
                                Settlement::Delivered,
                            )
                        }
                        Err(e) => {
                            tracing::warn!(
                                transport = e.is_transport(),
                                "❌ Chat request failed: {}",
                                e
                            );
                            (
                                Message::bot(
                                    self.ids.next_id(),
                                    CHAT_ERROR_TEXT,
                                    MessageCategory::Error,
                                ),
                                Settlement::Failed,
                            )
                        }
                    };

                    state.messages.push(message.clone());
                    state.last_settlement = Some(settlement);
                    let count = state.messages.len();

                    let outcome = match settlement {
                        Settlement::Delivered => SendOutcome::Delivered(message.clone()),
                        _ => SendOutcome::Failed(message.clone()),
                    };
                    (outcome, Some((count, message)))
                }
            }
        };

        if let Some((count, message)) = appended {
            self.broadcaster.broadcast(StateChange::MessageAppended { count, message });
        }
        self.broadcaster.broadcast(StateChange::AwaitingResponseChanged(false));

        outcome
    }
}

/// 応答待ちのターン
///
/// send()のFutureが途中で破棄された場合でも応答待ちを解除し、
/// ターンを中断扱いで決着させる。
struct InFlightTurn<'a> {
    chat: &'a ChatSession,
    armed: bool,
}

impl<'a> InFlightTurn<'a> {
    fn new(chat: &'a ChatSession) -> Self {
        Self { chat, armed: true }
    }

    /// 応答を受け取った（以降の後始末はsend()側で行う）
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightTurn<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        {
            let mut state = self.chat.state.lock();
            state.awaiting = false;
            state.last_settlement = Some(Settlement::Cancelled);
        }
        tracing::info!("🛑 Chat turn dropped before the response arrived");
        self.chat.broadcaster.broadcast(StateChange::AwaitingResponseChanged(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{ChatResponse, HistoricalRecord, PredictResponse, StatLine};
    use crate::api::FetchError;
    use crate::session::models::{PredictionResult, Sender};
    use async_trait::async_trait;

    /// 受け取ったメッセージを返すだけのAPI
    struct EchoApi {
        fail: bool,
        seen: parking_lot::Mutex<Vec<ChatRequest>>,
    }

    impl EchoApi {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PredictionApi for EchoApi {
        async fn predict(&self, _stats: &StatLine) -> Result<PredictResponse, FetchError> {
            unreachable!("chat never predicts")
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError> {
            self.seen.lock().push(request.clone());
            if self.fail {
                return Err(FetchError::Status {
                    endpoint: "/chat",
                    status: 502,
                });
            }
            Ok(ChatResponse {
                response: format!("echo: {}", request.message),
                kind: Some("comparison".to_string()),
            })
        }

        async fn fetch_history(&self) -> Result<Vec<HistoricalRecord>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn session(api: Arc<EchoApi>) -> (ChatSession, Arc<PredictionStore>) {
        let store = Arc::new(PredictionStore::new());
        let chat = ChatSession::new(
            api,
            Arc::clone(&store),
            Arc::new(StateBroadcaster::new()),
            CancellationToken::new(),
            "test",
        );
        (chat, store)
    }

    #[test]
    fn test_log_is_seeded_with_welcome() {
        let (chat, _) = session(Arc::new(EchoApi::new(false)));
        let messages = chat.messages();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert_eq!(messages[0].category, Some(MessageCategory::General));
        assert_eq!(messages[0].text, WELCOME_MESSAGE);
        assert_eq!(chat.turn_state(), TurnState::Idle);
    }

    #[test]
    fn test_quick_action_sets_pending_verbatim() {
        let (chat, _) = session(Arc::new(EchoApi::new(false)));

        for (index, preset) in QUICK_ACTIONS.iter().enumerate() {
            assert_eq!(chat.select_quick_action(index), Some(*preset));
            assert_eq!(chat.pending_input(), *preset);
        }
        assert_eq!(chat.turn_state(), TurnState::Composing);

        assert_eq!(chat.select_quick_action(QUICK_ACTIONS.len()), None);
        assert_eq!(chat.pending_input(), QUICK_ACTIONS[3]);
        // 送信はしない
        assert_eq!(chat.message_count(), 1);
    }

    #[test]
    fn test_quick_actions_visible_after_prediction() {
        let (chat, store) = session(Arc::new(EchoApi::new(false)));
        assert!(!chat.quick_actions_visible());

        store.replace(
            StatLine::default(),
            PredictionResult {
                verdict: true,
                probability: None,
                explanation: None,
            },
        );
        assert!(chat.quick_actions_visible());
    }

    #[tokio::test]
    async fn test_empty_input_is_not_sent() {
        let api = Arc::new(EchoApi::new(false));
        let (chat, _) = session(Arc::clone(&api));
        chat.set_pending_input("   ");

        assert_eq!(chat.send().await, SendOutcome::Empty);
        assert_eq!(chat.message_count(), 1);
        assert!(api.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delivered_turn() {
        let api = Arc::new(EchoApi::new(false));
        let (chat, _) = session(Arc::clone(&api));
        chat.set_pending_input("How can I improve?");

        let outcome = chat.send().await;

        let messages = chat.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].text, "How can I improve?");
        assert_eq!(messages[2].text, "echo: How can I improve?");
        assert_eq!(messages[2].category, Some(MessageCategory::Comparison));
        assert!(matches!(outcome, SendOutcome::Delivered(ref m) if m.id == messages[2].id));
        assert_eq!(chat.pending_input(), "");
        assert!(!chat.is_awaiting_response());
        assert_eq!(chat.last_settlement(), Some(Settlement::Delivered));
        assert!(api.seen.lock()[0].prediction_data.is_none());
    }

    #[tokio::test]
    async fn test_failed_turn_appends_error() {
        let (chat, _) = session(Arc::new(EchoApi::new(true)));
        chat.set_pending_input("Why is my prediction low?");

        let outcome = chat.send().await;

        let last = chat.last_message().unwrap();
        assert!(last.is_error());
        assert_eq!(last.text, CHAT_ERROR_TEXT);
        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert!(!chat.is_awaiting_response());
        assert_eq!(chat.last_settlement(), Some(Settlement::Failed));
        assert_eq!(chat.message_count(), 3);
    }

    #[tokio::test]
    async fn test_context_is_attached_when_available() {
        let api = Arc::new(EchoApi::new(false));
        let (chat, store) = session(Arc::clone(&api));
        let inputs = StatLine {
            passing_tds: 28.0,
            ..StatLine::default()
        };
        store.replace(
            inputs,
            PredictionResult {
                verdict: false,
                probability: Some(0.3),
                explanation: None,
            },
        );

        chat.set_pending_input("Compare to Josh Allen");
        chat.send().await;

        assert_eq!(api.seen.lock()[0].prediction_data, Some(inputs));
    }

    /// 応答を返さないAPI
    struct HangingApi;

    #[async_trait]
    impl PredictionApi for HangingApi {
        async fn predict(&self, _stats: &StatLine) -> Result<PredictResponse, FetchError> {
            std::future::pending().await
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, FetchError> {
            std::future::pending().await
        }

        async fn fetch_history(&self) -> Result<Vec<HistoricalRecord>, FetchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_dropped_send_releases_awaiting() {
        let store = Arc::new(PredictionStore::new());
        let broadcaster = Arc::new(StateBroadcaster::new());
        let mut events = broadcaster.subscribe();
        let chat = ChatSession::new(
            Arc::new(HangingApi),
            store,
            broadcaster,
            CancellationToken::new(),
            "drop",
        );
        chat.set_pending_input("are you there?");

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), chat.send()).await;

        assert!(result.is_err());
        assert!(!chat.is_awaiting_response());
        assert_eq!(chat.turn_state(), TurnState::Idle);
        assert_eq!(chat.last_settlement(), Some(Settlement::Cancelled));
        // ユーザーメッセージは残り、ボットメッセージは追加されない
        assert_eq!(chat.message_count(), 2);

        let mut awaiting = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let StateChange::AwaitingResponseChanged(flag) = event {
                awaiting.push(flag);
            }
        }
        assert_eq!(awaiting, vec![true, false]);

        chat.set_pending_input("hello again");
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), chat.send()).await;
        assert!(result.is_err(), "next send should reach the service, not return Busy");
    }

    #[tokio::test]
    async fn test_closed_session_rejects_send() {
        let store = Arc::new(PredictionStore::new());
        let cancel = CancellationToken::new();
        let chat = ChatSession::new(
            Arc::new(EchoApi::new(false)),
            store,
            Arc::new(StateBroadcaster::new()),
            cancel.clone(),
            "closed",
        );
        cancel.cancel();
        chat.set_pending_input("hello");

        assert_eq!(chat.send().await, SendOutcome::Closed);
        assert_eq!(chat.message_count(), 1);
    }
}
