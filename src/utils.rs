// ログ初期化などのユーティリティ関数

use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config_manager::{ConfigManager, LogConfig};

/// ログ初期化
///
/// RUST_LOGが設定されていればそれを優先する。ファイル出力が有効な場合は
/// 返されたガードを保持している間だけ書き込まれる。
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let log_dir = if config.enable_file_logging {
        config.log_dir.clone().or_else(ConfigManager::default_log_dir)
    } else {
        None
    };

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, "mvp-assistant.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()?;

            debug!("📁 File logging enabled: {}", dir.display());
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()?;
            Ok(None)
        }
    }
}

/// エラー詳細のログ
pub fn log_error_with_context(error: &anyhow::Error, context: &str) {
    error!(
        context = context,
        error = %error,
        error_chain = ?error.chain().collect::<Vec<_>>(),
        "❌ Error occurred"
    );
}

/// メッセージ本文のプレビュー（ログ用、先頭50文字）
pub fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");

        let long = "é".repeat(80);
        assert_eq!(preview(&long).chars().count(), 50);
    }
}
