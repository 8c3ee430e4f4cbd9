use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use microviz_control::{
    AppState, ControlError, MetadataProvider, NowPlaying, SpectrumFrame, StreamServer,
    StreamServerConfig, TrackSource,
};
use microviz_core::{CaptureCycle, SettingsStore, SpectrumState};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

struct Offline;

#[async_trait]
impl TrackSource for Offline {
    async fn now_playing(&self) -> microviz_control::Result<NowPlaying> {
        Err(ControlError::Metadata("no session bus".to_string()))
    }
}

/// Lookup that takes a noticeable share of the broadcast interval
struct SlowLookup;

#[async_trait]
impl TrackSource for SlowLookup {
    async fn now_playing(&self) -> microviz_control::Result<NowPlaying> {
        tokio::time::sleep(Duration::from_millis(60)).await;
        Ok(NowPlaying::new("Slow", "Lookup"))
    }
}

struct Playing;

#[async_trait]
impl TrackSource for Playing {
    async fn now_playing(&self) -> microviz_control::Result<NowPlaying> {
        Ok(NowPlaying::new("Xtal", "Aphex Twin"))
    }
}

fn state(metadata: MetadataProvider) -> AppState {
    let settings = Arc::new(SettingsStore::default());
    let spectrum = Arc::new(SpectrumState::new(settings.snapshot().num_bars));
    AppState {
        settings,
        spectrum,
        metadata,
    }
}

async fn start(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = StreamServer::new(StreamServerConfig::default(), state).router();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .unwrap();
    });
    addr
}

async fn next_frame<S>(stream: &mut S) -> SpectrumFrame
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");
    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_frames_degrade_to_unknown_metadata() {
    let state = state(MetadataProvider::new(Offline));
    let addr = start(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    for _ in 0..3 {
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame.fft.len(), 300);
        assert!(frame.fft.iter().all(|v| *v == 0.0));
        assert_eq!(frame.title, "Unknown");
        assert_eq!(frame.artist, "Unknown");
    }
}

#[tokio::test]
async fn test_root_path_streams_scaled_bars() {
    let state = state(MetadataProvider::new(Playing));
    state.spectrum.publish(vec![0.25; 300]);
    let addr = start(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
        .await
        .unwrap();

    let frame = next_frame(&mut ws).await;
    assert!(frame.fft.iter().all(|v| *v == 25.0));
    assert_eq!(frame.title, "Xtal");
    assert_eq!(frame.artist, "Aphex Twin");
}

#[tokio::test]
async fn test_bar_count_change_reaches_connected_viewer() {
    let state = state(MetadataProvider::disabled());
    let mut cycle = CaptureCycle::new(state.settings.clone(), state.spectrum.clone());
    let addr = start(state.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut ws).await.fft.len(), 300);

    state.settings.update(&json!({"NUM_BARS": 50})).unwrap();
    let block: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.1).sin()).collect();
    cycle.process_block(&block);

    // Frames already in flight may still carry the old length
    let mut saw_new_length = false;
    for _ in 0..20 {
        let frame = next_frame(&mut ws).await;
        if frame.fft.len() == 50 {
            assert!(frame.fft.iter().all(|v| (0.0..=100.0).contains(v)));
            saw_new_length = true;
            break;
        }
    }
    assert!(saw_new_length);
}

#[tokio::test]
async fn test_viewer_disconnect_does_not_affect_others() {
    let state = state(MetadataProvider::disabled());
    let addr = start(state).await;
    let url = format!("ws://{}/ws", addr);

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    next_frame(&mut first).await;
    next_frame(&mut second).await;

    first.close(None).await.unwrap();
    drop(first);

    for _ in 0..3 {
        assert_eq!(next_frame(&mut second).await.fft.len(), 300);
    }

    second.send(Message::Text("ignored".into())).await.unwrap();
    assert_eq!(next_frame(&mut second).await.fft.len(), 300);
}

#[tokio::test]
async fn test_slow_metadata_does_not_stretch_the_period() {
    let state = state(MetadataProvider::new(SlowLookup));
    state
        .settings
        .update(&json!({"SEND_INTERVAL": 0.1}))
        .unwrap();
    let addr = start(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    next_frame(&mut ws).await;
    let first = std::time::Instant::now();
    for _ in 0..5 {
        assert_eq!(next_frame(&mut ws).await.title, "Slow");
    }
    let period = first.elapsed() / 5;

    // Sleeping a full interval after each lookup would give ~160ms
    assert!(
        period < Duration::from_millis(140),
        "period {:?} exceeds the 100ms interval",
        period
    );
    assert!(period >= Duration::from_millis(80), "period {:?}", period);
}
