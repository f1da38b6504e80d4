use crate::live::LiveEvent;
use crate::server::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Which live events a stream forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    All,
    Weather,
    Shops,
}

impl Feed {
    fn accepts(self, event: &LiveEvent) -> bool {
        match self {
            Feed::All => true,
            Feed::Weather => matches!(event, LiveEvent::Weather(_)),
            Feed::Shops => matches!(event, LiveEvent::Shops(_)),
        }
    }
}

fn to_sse(event: LiveEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event.data())
}

/// Current state first, then every change the feed accepts. Lagged
/// subscribers skip what they missed.
pub fn live_stream(state: &AppState, feed: Feed) -> impl Stream<Item = Result<Event, axum::Error>> {
    let updates = BroadcastStream::new(state.live.subscribe());

    let mut initial = Vec::new();
    if feed != Feed::Shops {
        initial.push(LiveEvent::Weather(state.live.weather()));
    }
    if feed != Feed::Weather {
        initial.push(LiveEvent::Shops(state.live.shops()));
    }

    let updates = updates.filter_map(move |msg| match msg {
        Ok(event) if feed.accepts(&event) => Some(event),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("SSE subscriber lagged: {}", e);
            None
        }
    });

    tokio_stream::iter(initial).chain(updates).map(to_sse)
}

fn sse(state: &AppState, feed: Feed) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!(?feed, "SSE client connected");
    Sse::new(live_stream(state, feed)).keep_alive(KeepAlive::default())
}

// GET /live
pub async fn snapshot(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.live.snapshot()))
}

// GET /live/weather
pub async fn weather(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "weather": state.live.weather() }))
}

// GET /live/shops
pub async fn shops(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.live.shops()))
}

// GET /live/stream
pub async fn stream_all(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    sse(&state, Feed::All)
}

// GET /live/weather/stream
pub async fn stream_weather(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    sse(&state, Feed::Weather)
}

// GET /live/shops/stream
pub async fn stream_shops(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    sse(&state, Feed::Shops)
}
