use std::sync::Arc;

use clap::Parser;
use mvp_assistant::{
    config_manager::{AppConfig, ConfigManager},
    session::{Message, Sender, StatField},
    utils, AssistantError, AssistantResult, AssistantSession, HistoricalTable,
    HttpPredictionClient, SendOutcome, SubmitOutcome, ValidationPolicy,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// NFL MVP予測アシスタント（端末版）
#[derive(Parser, Debug)]
#[command(name = "mvp-assistant", version, about = "Quarterback MVP prediction assistant")]
struct Args {
    /// 予測サービスのベースURL
    #[arg(long)]
    base_url: Option<String>,

    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// 未入力・非数値の項目があっても送信する
    #[arg(long)]
    permissive: bool,

    /// リクエストタイムアウト（ミリ秒）
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 引数を反映した設定を設定ファイルへ保存する
    #[arg(long)]
    write_config: bool,
}

const HELP: &str = "\
Commands:
  set <field> <value>   set one stat field
  fields                show all fields
  predict               submit the stats
  ask <text>            send a chat message
  quick <n>             put quick question n into the input
  send                  send the current input
  history               show past MVP winners
  log                   show the chat log
  help                  show this help
  quit                  exit";

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config()?;
    config.apply_env_overrides();

    if let Some(url) = &args.base_url {
        config.api.base_url = url.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.api.request_timeout_ms = timeout_ms;
    }
    if args.permissive {
        config.form.validation = ValidationPolicy::Permissive;
    }
    if args.write_config {
        manager.save_config(&config)?;
        println!("Saved settings to {}", manager.config_path().display());
    }
    Ok(config)
}

fn print_message(message: &Message) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Bot => "assistant",
    };
    let tag = message
        .category
        .map(|c| format!(" [{}]", c.as_str()))
        .unwrap_or_default();
    println!("{} {}{}: {}", message.display_time(), who, tag, message.text);
}

fn stat_text(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_fields(session: &AssistantSession) {
    let fields = session.form().fields();
    for (field, value) in fields.iter() {
        let shown = if value.is_empty() { "-" } else { value };
        println!(
            "  {:<14} {:<24} {:<10} {} (e.g. {})",
            field.key(),
            field.label(),
            shown,
            field.description(),
            field.example()
        );
    }
}

async fn send_and_print(session: &AssistantSession) {
    match session.chat().send().await {
        SendOutcome::Delivered(message) | SendOutcome::Failed(message) => print_message(&message),
        SendOutcome::Busy => println!("Still waiting for the previous answer."),
        SendOutcome::Empty => println!("Nothing to send."),
        SendOutcome::Closed | SendOutcome::Cancelled => println!("Session closed."),
    }
}

async fn handle_line(session: &AssistantSession, line: &str) -> AssistantResult<bool> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

    match command {
        "" => {}
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(false),
        "set" => {
            let (name, value) = rest.trim().split_once(' ').ok_or_else(|| {
                AssistantError::InvalidInput("usage: set <field> <value>".to_string())
            })?;
            session.form().set_field_by_name(name, value.trim())?;
        }
        "fields" => print_fields(session),
        "predict" => match session.form().submit().await {
            SubmitOutcome::Rejected { missing, invalid } => {
                let names = |fields: &[StatField]| {
                    fields.iter().map(|f| f.key()).collect::<Vec<_>>().join(", ")
                };
                println!("{}", session.form().status_text());
                if !missing.is_empty() {
                    println!("  missing: {}", names(&missing));
                }
                if !invalid.is_empty() {
                    println!("  not a number: {}", names(&invalid));
                }
            }
            SubmitOutcome::Busy => println!("A prediction is already in progress."),
            _ => {
                let status = session.form().status();
                println!("{}", status.message());
                if status.is_sentinel() {
                    if let Some(previous) = session.predictions().result() {
                        println!("  last prediction: {}", previous.verdict_text());
                    }
                }
            }
        },
        "ask" => {
            session.chat().set_pending_input(rest);
            send_and_print(session).await;
        }
        "quick" if !session.chat().quick_actions_visible() => {
            println!("Make a prediction first to unlock quick questions.");
        }
        "quick" => {
            let index = rest
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1));
            match index.and_then(|i| session.chat().select_quick_action(i)) {
                Some(action) => println!("Input: {}", action),
                None => {
                    for (i, action) in session.chat().quick_actions().iter().enumerate() {
                        println!("  {}. {}", i + 1, action);
                    }
                }
            }
        }
        "send" => send_and_print(session).await,
        "history" => {
            let table = HistoricalTable::load(session.api().as_ref()).await;
            if table.is_empty() {
                println!("No historical data available.");
            }
            for row in &table.winners {
                println!(
                    "  {} {:<22} {:<4} {:<6} {:>5} yds {:>3} TD {:>3} INT",
                    row.player.season,
                    row.player.full_name(),
                    row.player.team,
                    row.record_text(),
                    stat_text(row.player.passing_yards),
                    stat_text(row.player.passing_tds),
                    stat_text(row.player.interceptions)
                );
            }
        }
        "log" => session.chat().messages().iter().for_each(print_message),
        other => println!("Unknown command '{}'. Type 'help'.", other),
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = utils::init_logging(&config.log)?;

    tracing::info!("🏈 Starting mvp-assistant against {}", config.api.base_url);

    let client = HttpPredictionClient::new(config.api.base_url.clone(), config.api.timeout())?;
    let session = AssistantSession::new(Arc::new(client), config.form.validation);

    if let Some(welcome) = session.chat().messages().first() {
        print_message(welcome);
    }
    println!("{}", session.form().status_text());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Received interrupt");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else { break };

        match handle_line(&session, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                let error = anyhow::Error::new(e);
                utils::log_error_with_context(&error, "command");
                println!("{}", error);
            }
        }
    }

    session.shutdown();
    tracing::info!("👋 mvp-assistant shutting down");
    Ok(())
}
