//! MPRIS lookup over the D-Bus session bus
//!
//! Uses `busctl --user --json=short` so replies arrive as JSON:
//! 1. `ListNames` on the bus daemon, first name starting with
//!    `org.mpris.MediaPlayer2.`
//! 2. `Metadata` property of `org.mpris.MediaPlayer2.Player` on that player
//!
//! Every call is bounded by a timeout and the child is killed if it expires.
//!
//! The player name from step 1 is remembered, so a steady-state lookup is a
//! single `busctl` call. Names are listed again as soon as the remembered
//! player stops answering.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use super::{NowPlaying, TrackSource, UNKNOWN};
use crate::{ControlError, Result};

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Queries the first registered MPRIS player
#[derive(Debug)]
pub struct MprisSource {
    program: String,
    timeout: Duration,
    player: Mutex<Option<String>>,
}

impl Default for MprisSource {
    fn default() -> Self {
        Self {
            program: "busctl".to_string(),
            timeout: DEFAULT_TIMEOUT,
            player: Mutex::new(None),
        }
    }
}

impl MprisSource {
    /// Use a different `busctl` executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn busctl(&self, args: &[&str]) -> Result<Value> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .arg("--user")
                .arg("--json=short")
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ControlError::Metadata(format!("{} timed out", self.program)))?
        .map_err(|e| ControlError::Metadata(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ControlError::Metadata(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn find_player(&self) -> Result<String> {
        let names = self
            .busctl(&[
                "call",
                "org.freedesktop.DBus",
                "/org/freedesktop/DBus",
                "org.freedesktop.DBus",
                "ListNames",
            ])
            .await?;

        first_player(&names)
            .ok_or_else(|| ControlError::Metadata("no MPRIS player registered".to_string()))
    }

    async fn read_metadata(&self, player: &str) -> Result<NowPlaying> {
        let metadata = self
            .busctl(&[
                "get-property",
                player,
                MPRIS_PATH,
                PLAYER_INTERFACE,
                "Metadata",
            ])
            .await?;

        Ok(parse_metadata(&metadata))
    }
}

#[async_trait]
impl TrackSource for MprisSource {
    async fn now_playing(&self) -> Result<NowPlaying> {
        let remembered = self.player.lock().clone();
        if let Some(player) = remembered {
            match self.read_metadata(&player).await {
                Ok(track) => return Ok(track),
                Err(e) => {
                    tracing::debug!("Player {} stopped answering: {}", player, e);
                    *self.player.lock() = None;
                }
            }
        }

        let player = self.find_player().await?;
        let track = self.read_metadata(&player).await?;
        *self.player.lock() = Some(player);
        Ok(track)
    }
}

/// First MPRIS bus name in a `ListNames` reply
fn first_player(reply: &Value) -> Option<String> {
    let data = &reply["data"];
    // Method replies wrap the out-arguments in an outer array
    let names = match data.get(0) {
        Some(Value::Array(inner)) => inner,
        _ => data.as_array()?,
    };
    names
        .iter()
        .filter_map(Value::as_str)
        .find(|name| name.starts_with(MPRIS_PREFIX))
        .map(str::to_string)
}

/// Title and first artist from a `Metadata` property reply
fn parse_metadata(reply: &Value) -> NowPlaying {
    let fields = &reply["data"];

    let title = fields["xesam:title"]["data"]
        .as_str()
        .unwrap_or(UNKNOWN)
        .to_string();

    let artist = match &fields["xesam:artist"]["data"] {
        Value::Array(artists) => artists.first().and_then(Value::as_str),
        Value::String(artist) => Some(artist.as_str()),
        _ => None,
    }
    .unwrap_or(UNKNOWN)
    .to_string();

    NowPlaying { title, artist }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_player_from_method_reply() {
        let reply = json!({
            "type": "as",
            "data": [[
                "org.freedesktop.DBus",
                ":1.4",
                "org.mpris.MediaPlayer2.spotify",
                "org.mpris.MediaPlayer2.vlc"
            ]]
        });
        assert_eq!(
            first_player(&reply).as_deref(),
            Some("org.mpris.MediaPlayer2.spotify")
        );
    }

    #[test]
    fn test_first_player_none_registered() {
        let reply = json!({"type": "as", "data": [["org.freedesktop.DBus", ":1.4"]]});
        assert_eq!(first_player(&reply), None);
        assert_eq!(first_player(&json!({})), None);
    }

    #[test]
    fn test_parse_full_metadata() {
        let reply = json!({
            "type": "a{sv}",
            "data": {
                "mpris:trackid": {"type": "o", "data": "/org/mpris/MediaPlayer2/Track/1"},
                "xesam:title": {"type": "s", "data": "Windowlicker"},
                "xesam:artist": {"type": "as", "data": ["Aphex Twin", "Someone Else"]}
            }
        });
        assert_eq!(
            parse_metadata(&reply),
            NowPlaying::new("Windowlicker", "Aphex Twin")
        );
    }

    #[test]
    fn test_parse_missing_fields_default_independently() {
        let no_artist = json!({
            "type": "a{sv}",
            "data": {"xesam:title": {"type": "s", "data": "Untitled"}}
        });
        assert_eq!(parse_metadata(&no_artist), NowPlaying::new("Untitled", UNKNOWN));

        let empty_artists = json!({
            "type": "a{sv}",
            "data": {"xesam:artist": {"type": "as", "data": []}}
        });
        assert_eq!(parse_metadata(&empty_artists), NowPlaying::unknown());

        assert_eq!(parse_metadata(&json!("garbage")), NowPlaying::unknown());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let source = MprisSource::default().with_program("/nonexistent/busctl");
        assert!(source.now_playing().await.is_err());
        assert!(source.player.lock().is_none());
    }

    /// Stand-in `busctl` that logs its arguments and answers for one player
    #[cfg(unix)]
    fn fake_busctl(dir: &std::path::Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("busctl");
        std::fs::write(
            &script,
            format!(
                r#"#!/bin/sh
echo "$@" >> "{log}"
case "$*" in
  *ListNames*) echo '{{"type":"as","data":[["org.freedesktop.DBus","org.mpris.MediaPlayer2.fake"]]}}' ;;
  *MediaPlayer2.fake*) echo '{{"type":"a{{sv}}","data":{{"xesam:title":{{"type":"s","data":"Roygbiv"}},"xesam:artist":{{"type":"as","data":["Boards of Canada"]}}}}}}' ;;
  *) echo "unknown name" >&2; exit 1 ;;
esac
"#,
                log = log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn list_calls(dir: &std::path::Path) -> usize {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|l| l.contains("ListNames"))
            .count()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_name_is_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = MprisSource::default()
            .with_program(fake_busctl(dir.path()).display().to_string())
            .with_timeout(Duration::from_secs(5));

        for _ in 0..3 {
            assert_eq!(
                source.now_playing().await.unwrap(),
                NowPlaying::new("Roygbiv", "Boards of Canada")
            );
        }
        assert_eq!(list_calls(dir.path()), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_vanished_player_is_looked_up_again() {
        let dir = tempfile::tempdir().unwrap();
        let source = MprisSource::default()
            .with_program(fake_busctl(dir.path()).display().to_string())
            .with_timeout(Duration::from_secs(5));
        *source.player.lock() = Some("org.mpris.MediaPlayer2.gone".to_string());

        let track = source.now_playing().await.unwrap();
        assert_eq!(track.title, "Roygbiv");
        assert_eq!(list_calls(dir.path()), 1);
        assert_eq!(
            source.player.lock().as_deref(),
            Some("org.mpris.MediaPlayer2.fake")
        );
    }
}
