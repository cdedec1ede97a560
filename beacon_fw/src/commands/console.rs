// src/commands/console.rs
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::ControlAction;

/// Dev console: one JSON `ControlAction` per stdin line.
pub fn spawn(tx: mpsc::Sender<ControlAction>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(action) = parse_line(&line) {
                        info!(?action, "console: action queued");
                        if tx.send(action).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    info!("console: stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("console read error: {e}");
                    break;
                }
            }
        }
    });
}

fn parse_line(line: &str) -> Option<ControlAction> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(action) => Some(action),
        Err(e) => {
            warn!("console: ignoring {line:?}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn skips_blank_comment_and_garbage() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# hello"), None);
        assert_eq!(parse_line("reboot please"), None);
        assert_eq!(
            parse_line(r#" {"action":"set_output","on":true} "#),
            Some(ControlAction::SetOutput { on: true })
        );
    }

    proptest! {
        #[test]
        fn arbitrary_lines_never_panic(line in ".{0,200}") {
            let _ = parse_line(&line);
        }

        #[test]
        fn reporting_rate_lines_parse(seconds in any::<u32>()) {
            let line = format!(r#"{{"action":"set_reporting_rate","rate":"moving","seconds":{seconds}}}"#);
            prop_assert_eq!(
                parse_line(&line),
                Some(ControlAction::SetReportingRate { rate: crate::config::RateKind::Moving, seconds })
            );
        }
    }
}
