use super::event::{AppEvent, UiEvent};
use crate::debug_hooks;
use crate::feed::endpoints::is_valid_bot_id;
use crate::feed::DataSourceKind;
use crate::timeframe::Timeframe;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

pub const HELP: &str = "commands: symbol <S> | tf <TF> | source <name> | live on|off | bot <id>|off | refresh | clear | status | quit";

/// One stdin line -> one event. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<AppEvent>, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments; {HELP}"));
    }

    let ui = match (cmd.to_ascii_lowercase().as_str(), arg) {
        ("symbol", Some(s)) => UiEvent::SymbolChanged {
            symbol: s.to_ascii_uppercase(),
        },
        ("tf" | "timeframe", Some(tf)) => UiEvent::TimeframeChanged {
            timeframe: tf.parse::<Timeframe>()?,
        },
        ("source", Some(src)) => UiEvent::DataSourceChanged {
            source: src.parse::<DataSourceKind>()?,
        },
        ("live", Some(v)) => UiEvent::RealtimeToggled {
            enabled: parse_switch(v)?,
        },
        ("bot", Some(id)) => UiEvent::BotChanged {
            bot_id: match id.to_ascii_lowercase().as_str() {
                "off" | "none" => None,
                _ if is_valid_bot_id(id) => Some(id.to_string()),
                _ => return Err(format!("invalid bot id {id:?}")),
            },
        },
        ("refresh", None) => UiEvent::Refresh,
        ("clear", None) => UiEvent::ClearMarkers,
        ("status", None) => UiEvent::StatusRequested,
        ("quit" | "exit", None) => return Ok(Some(AppEvent::Shutdown)),
        ("help", None) => return Err(HELP.to_string()),
        _ => return Err(format!("unknown command; {HELP}")),
    };
    Ok(Some(AppEvent::Ui(ui)))
}

fn parse_switch(v: &str) -> Result<bool, String> {
    match v.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on|off, got {other:?}")),
    }
}

/// Feeds stdin lines into the event loop until EOF or until the loop is gone.
pub fn spawn_stdin_reader(tx: UnboundedSender<AppEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("stdin closed: {err}");
                    break;
                }
            };
            match parse_command(&line) {
                Ok(Some(ev)) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(msg) => debug_hooks::log_command(&line, msg),
            }
        }
    })
}
