// Core modules
pub mod chat; // チャットセッションマネージャ
pub mod context; // セッション単位の状態ストア
pub mod form; // 予測フォームコントローラ
pub mod models;
pub mod prediction_store;
pub mod state_broadcaster;

pub use chat::{ChatSession, SendOutcome, Settlement, TurnState};
pub use context::AssistantSession;
pub use form::{PredictionForm, SubmitOutcome, ValidationPolicy};
pub use models::{
    InputFields, Message, MessageCategory, MessageId, PredictionResult, PredictionStatus, Sender,
    StatField, QUICK_ACTIONS,
};
pub use prediction_store::{PredictionSnapshot, PredictionStore};
pub use state_broadcaster::{StateBroadcaster, StateChange};
