//! Session drivers for the `cb` binary
//!
//! Both drivers consume the same JSON-lines script format. `run_stdio` reads
//! it live from stdin and writes frames to stdout, waking for debounce and
//! reply deadlines in between. `replay` runs a script file under a
//! [`ManualClock`], so the same script always produces the same frames.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::*;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::error::BridgeError;
use crate::protocol::Item;
use crate::session::{ComponentSession, SessionMetrics, reply_once};
use crate::transport::{InboundEvent, MemoryTransport, RawPayload, StdioTransport};

/// One scripted action against the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScriptEvent {
    /// Message arriving from the host
    Inbound { origin: String, data: RawPayload },

    /// Component-side call; its reply is logged
    Call {
        action: String,
        #[serde(default)]
        data: Option<Value>,
    },

    /// Save request handed to the coalescer
    Save {
        items: Vec<Item>,
        #[serde(default, rename = "skip-debounce")]
        skip_debounce: bool,
    },

    /// Subscribe to the context item
    StreamContextItem,

    /// Toggle the local theme policy
    AcceptThemes { enabled: bool },
}

/// A script line: an event plus an optional time offset from the start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    #[serde(default, rename = "at-ms", skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,

    #[serde(flatten)]
    pub event: ScriptEvent,
}

/// Parse a JSON-lines script; blank lines and `#` comments are skipped
pub fn parse_script(content: &str) -> Result<Vec<ScriptLine>> {
    debug!(bytes = content.len(), "parse_script: called");
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| serde_json::from_str(line).context(format!("Invalid script event on line {}", n + 1)))
        .collect()
}

/// Apply one event to the session
pub fn apply(session: &mut ComponentSession, event: ScriptEvent) -> Result<(), BridgeError> {
    debug!(?event, "apply: called");
    match event {
        ScriptEvent::Inbound { origin, data } => session.receive(InboundEvent { origin, data }),
        ScriptEvent::Call { action, data } => {
            let name = action.clone();
            session
                .send(
                    &action,
                    data,
                    Some(reply_once(move |_, reply| info!(action = %name, %reply, "Reply received"))),
                )
                .map(|_| ())
        }
        ScriptEvent::Save { items, skip_debounce } => session.request_save(items, None, None, skip_debounce),
        ScriptEvent::StreamContextItem => session
            .stream_context_item(|_, item| {
                info!(uuid = %item.uuid, text = ?item.text(), metadata = item.is_metadata_update(), "Context item update")
            })
            .map(|_| ()),
        ScriptEvent::AcceptThemes { enabled } => {
            session.set_accepts_themes(enabled);
            Ok(())
        }
    }
}

/// Run one session over stdin/stdout until stdin closes
pub async fn run_stdio(config: &Config) -> Result<SessionMetrics> {
    info!("Starting stdio bridge");
    let mut session = ComponentSession::open(config.bridge.clone(), StdioTransport::new(std::io::stdout()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("run_stdio: stdin closed");
                    break;
                };
                handle_line(&mut session, &line);
            }
            _ = sleep_until(deadline) => {
                if let Err(e) = session.poll() {
                    warn!(error = %e, "Timer poll failed");
                }
            }
        }
    }

    let metrics = session.close();
    info!(?metrics, "Stdio bridge finished");
    Ok(metrics)
}

fn handle_line(session: &mut ComponentSession, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match serde_json::from_str::<ScriptLine>(line) {
        Ok(script_line) => {
            if script_line.at_ms.is_some() {
                debug!("handle_line: at-ms ignored in live mode");
            }
            if let Err(e) = apply(session, script_line.event) {
                warn!(error = %e, "Event failed");
            }
        }
        Err(e) => warn!(error = %e, "Skipping unparseable input line"),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Replay a script file, writing every posted frame to `out`
pub fn replay(config: &Config, script: &Path, out: &mut impl Write) -> Result<SessionMetrics> {
    debug!(?script, "replay: called");
    let content = std::fs::read_to_string(script).context(format!("Failed to read script {}", script.display()))?;
    let lines = parse_script(&content)?;
    info!(events = lines.len(), "Replaying script");

    let clock = ManualClock::new();
    let transport = MemoryTransport::new();
    let mut session = ComponentSession::open(config.bridge.clone(), transport.clone()).with_clock(clock.clone());

    for line in lines {
        if let Some(at_ms) = line.at_ms {
            advance_until(&mut session, &clock, Duration::from_millis(at_ms));
            write_frames(&transport, out)?;
        }
        if let Err(e) = apply(&mut session, line.event) {
            warn!(error = %e, "Event failed");
        }
        write_frames(&transport, out)?;
    }

    let metrics = session.close();
    write_frames(&transport, out)?;
    Ok(metrics)
}

/// Move the clock to `target`, firing every timer due on the way in order
fn advance_until(session: &mut ComponentSession, clock: &ManualClock, target: Duration) {
    while let Some(deadline) = session.next_deadline() {
        let due = clock.elapsed() + deadline.saturating_duration_since(clock.now());
        if due > target {
            break;
        }
        clock.advance_to(due);
        if let Err(e) = session.poll() {
            warn!(error = %e, "Timer poll failed");
        }
    }
    clock.advance_to(target);
    if let Err(e) = session.poll() {
        warn!(error = %e, "Timer poll failed");
    }
}

fn write_frames(transport: &MemoryTransport, out: &mut impl Write) -> Result<()> {
    for frame in transport.take() {
        let line = serde_json::to_string(&frame).context("Failed to encode frame")?;
        writeln!(out, "{}", line).context("Failed to write frame")?;
    }
    Ok(())
}

/// Print session metrics for humans
pub fn print_summary(metrics: &SessionMetrics) {
    println!("{}", "Session summary".bold());
    println!("  {:<16} {}", "sent:", metrics.messages_sent.to_string().green());
    println!("  {:<16} {}", "received:", metrics.messages_received.to_string().green());
    println!("  {:<16} {}", "saves flushed:", metrics.saves_flushed.to_string().cyan());
    println!("  {:<16} {}", "queued:", metrics.queued_calls);
    println!("  {:<16} {}", "unanswered:", metrics.pending_calls);
    println!("  {:<16} {}", "expired:", metrics.expired_calls);

    let errors = metrics.decode_errors + metrics.desync_errors;
    let label = format!("decode {} / desync {}", metrics.decode_errors, metrics.desync_errors);
    if errors == 0 {
        println!("  {:<16} {}", "errors:", label.green());
    } else {
        println!("  {:<16} {}", "errors:", label.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PostedFrame;

    const SCRIPT: &str = r#"
# handshake arrives after the component has already queued a call
{"kind": "call", "action": "set-size", "data": {"type": "container", "width": 100, "height": 100}}
{"kind": "inbound", "origin": "https://host", "data": {"action": "component-registered", "sessionKey": "k"}}
{"kind": "save", "items": [{"uuid": "n", "content": {"text": "a"}}]}
{"at-ms": 100, "kind": "save", "items": [{"uuid": "n", "content": {"text": "ab"}}]}
{"at-ms": 150, "kind": "save", "items": [{"uuid": "n", "content": {"text": "abc"}}]}
{"at-ms": 1000, "kind": "accept-themes", "enabled": false}
"#;

    fn frames(output: &[u8]) -> Vec<PostedFrame> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_script_skips_comments() {
        let lines = parse_script(SCRIPT).unwrap();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[3].at_ms, Some(100));
        assert_eq!(lines[5].event, ScriptEvent::AcceptThemes { enabled: false });
    }

    #[test]
    fn test_parse_script_reports_line() {
        let err = parse_script("{\"kind\": \"call\", \"action\": \"x\"}\n{\"kind\": \"nope\"}").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_parse_inline_event_kinds() {
        let line: ScriptLine = serde_json::from_str(r#"{"kind": "stream-context-item"}"#).unwrap();
        assert_eq!(line.event, ScriptEvent::StreamContextItem);

        let line: ScriptLine =
            serde_json::from_str(r#"{"kind": "save", "items": [], "skip-debounce": true}"#).unwrap();
        assert_eq!(
            line.event,
            ScriptEvent::Save {
                items: Vec::new(),
                skip_debounce: true
            }
        );
    }

    #[test]
    fn test_replay_coalesces_saves() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let mut output = Vec::new();
        let metrics = replay(&Config::default(), file.path(), &mut output).unwrap();

        let frames = frames(&output);
        let actions: Vec<String> = frames
            .iter()
            .map(|f| f.message.to_value().unwrap()["action"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(actions, vec!["set-size", "save-items"]);

        let save = frames[1].message.to_value().unwrap();
        assert_eq!(save["data"]["items"][0]["content"]["text"], "abc");
        assert_eq!(frames[1].target_origin, "https://host");
        assert_eq!(metrics.saves_flushed, 1);
    }

    #[test]
    fn test_replay_flushes_pending_save_on_close() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"kind": "inbound", "origin": "o", "data": {{"action": "component-registered", "sessionKey": "k"}}}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"kind": "save", "items": [{{"uuid": "n", "content": {{"text": "x"}}}}]}}"#).unwrap();

        let mut output = Vec::new();
        replay(&Config::default(), file.path(), &mut output).unwrap();
        assert_eq!(frames(&output).len(), 1);
    }

    #[tokio::test]
    async fn test_sleep_until_past_deadline_returns() {
        sleep_until(Some(Instant::now())).await;
    }
}
