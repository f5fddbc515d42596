//! 状態変更のブロードキャストシステム
//!
//! フォームとチャットの状態変化を描画層へプッシュ通知する。
//! 描画層は状態を観測するだけで、書き換えは行わない。

use tokio::sync::broadcast;

use super::models::{Message, PredictionResult, PredictionStatus};

/// 状態変更イベント
#[derive(Clone, Debug)]
pub enum StateChange {
    /// チャットログに1件追加された
    MessageAppended {
        /// 追加後のメッセージ数
        count: usize,
        message: Message,
    },

    /// 応答待ちフラグが変化した
    AwaitingResponseChanged(bool),

    /// 入力中テキストが変化した
    PendingInputChanged(String),

    /// 予測送信中フラグが変化した
    SubmittingChanged(bool),

    /// 予測欄の表示状態が変化した
    PredictionStatusChanged(PredictionStatus),

    /// 新しい予測結果が保存された
    PredictionStored(PredictionResult),
}

/// 状態変更のブロードキャスター
///
/// バッファは256件。遅いサブスクライバーは古いイベントを取りこぼす（lagged）。
#[derive(Debug)]
pub struct StateBroadcaster {
    sender: broadcast::Sender<StateChange>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }

    /// 受信者がいない場合は破棄される
    pub fn broadcast(&self, change: StateChange) {
        let _ = self.sender.send(change);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
