//! # Room Chat Example
//!
//! Joins a listening room over WebSocket and turns stdin into room commands:
//!
//! - `/join` joins the playback queue
//! - `/queue <track-id>` queues a track
//! - `/device <device-id>` selects the playback device
//! - anything else is sent as a chat line
//!
//! Snapshot changes are logged as they arrive. Ctrl+C or EOF closes the room.
//!
//! ## Running
//!
//! ```sh
//! # Start a room server on 127.0.0.1:3030, then:
//! cargo run --example room_chat
//!
//! # Override the page origin and room:
//! ROOM_ORIGIN=https://rooms.example.com ROOM_ID=friday cargo run --example room_chat
//! ```

use listening_room_client::{
    ConnectionState, PageOrigin, RoomConfig, RoomConnection, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default page origin when `ROOM_ORIGIN` is not set.
const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3030";

/// Default room when `ROOM_ID` is not set.
const DEFAULT_ROOM: &str = "lobby";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Join,
    Queue(&'a str),
    Device(&'a str),
    Chat(&'a str),
    /// A command that needs an argument but got none.
    Usage(&'static str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    let (command, arg) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
    let arg = arg.trim();
    match command {
        "/join" => Input::Join,
        "/queue" if arg.is_empty() => Input::Usage("/queue <track-id>"),
        "/device" if arg.is_empty() => Input::Usage("/device <device-id>"),
        "/queue" => Input::Queue(arg),
        "/device" => Input::Device(arg),
        _ => Input::Chat(line),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let origin = std::env::var("ROOM_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
    let room_id = std::env::var("ROOM_ID").unwrap_or_else(|_| DEFAULT_ROOM.to_string());
    let config = RoomConfig::new(PageOrigin::parse(&origin)?);

    // ── Connect ─────────────────────────────────────────────────────
    let mut room = RoomConnection::init(WebSocketConnector, config, room_id)?;
    tracing::info!("Joining {}", room.url());

    let mut snapshots = room.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut seen_messages = 0;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                for msg in snapshot.messages.iter().skip(seen_messages) {
                    tracing::info!("<{}> {}", msg.from, msg.message);
                }
                seen_messages = snapshot.messages.len();
                tracing::debug!(
                    state = ?snapshot.state,
                    queue = ?snapshot.queue,
                    presences = ?snapshot.presences,
                    queue_changes = snapshot.queue_change_counter,
                    "room snapshot updated"
                );
                if snapshot.state == ConnectionState::Closed {
                    tracing::warn!(
                        "Disconnected: {}",
                        snapshot.disconnect_reason.as_deref().unwrap_or("closed")
                    );
                    break;
                }
            }

            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let result = match parse_input(&line) {
                    Input::Join => room.send_join_queue(),
                    Input::Queue(track) => room.send_queue_song(track),
                    Input::Device(device) => room.send_set_device(device),
                    Input::Chat(text) => room.send_chat_message(text),
                    Input::Usage(usage) => {
                        tracing::warn!("Usage: {usage}");
                        continue;
                    }
                };
                if let Err(e) = result {
                    tracing::error!("Command failed: {e}");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    room.close().await;
    tracing::info!("Room closed. Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse_input("/join"), Input::Join);
        assert_eq!(parse_input("/queue  t1 "), Input::Queue("t1"));
        assert_eq!(parse_input("/device dev-1"), Input::Device("dev-1"));
    }

    #[test]
    fn bare_commands_get_a_usage_hint_instead_of_a_chat_line() {
        assert_eq!(parse_input("/queue"), Input::Usage("/queue <track-id>"));
        assert_eq!(parse_input("/device   "), Input::Usage("/device <device-id>"));
    }

    #[test]
    fn everything_else_is_chat() {
        assert_eq!(parse_input("hello room"), Input::Chat("hello room"));
        assert_eq!(parse_input("/queueing is fun"), Input::Chat("/queueing is fun"));
    }
}
