use super::patch::LiveMessage;
use super::shop::{self, ShopState, SlimShops};
use super::weather::{self, WeatherState};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Weather(Option<String>),
    Shops(Option<SlimShops>),
}

impl LiveEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Weather(_) => "weather",
            LiveEvent::Shops(_) => "shops",
        }
    }

    pub fn data(&self) -> Value {
        match self {
            LiveEvent::Weather(w) => json!({ "weather": w }),
            LiveEvent::Shops(s) => serde_json::to_value(s).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LiveSnapshot {
    pub weather: Option<String>,
    pub shops: Option<SlimShops>,
}

#[derive(Default)]
struct LiveState {
    shops: ShopState,
    weather: WeatherState,
}

/// Current live state plus a broadcast of every change.
pub struct LiveHub {
    state: Mutex<LiveState>,
    events: broadcast::Sender<LiveEvent>,
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LiveHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { state: Mutex::new(LiveState::default()), events }
    }

    /// Feeds one raw socket frame through both reducers.
    pub fn handle_raw(&self, raw: &str) {
        if let Some(msg) = LiveMessage::parse(raw) {
            self.handle_message(&msg);
        }
    }

    pub fn handle_message(&self, msg: &LiveMessage) {
        let mut emitted = Vec::new();
        {
            let mut state = lock(&self.state);
            let (shops, shop_event) = shop::reduce(std::mem::take(&mut state.shops), msg);
            state.shops = shops;
            let (weather, weather_event) = weather::reduce(std::mem::take(&mut state.weather), msg);
            state.weather = weather;

            if let Some(view) = shop_event {
                emitted.push(LiveEvent::Shops(view));
            }
            if let Some(w) = weather_event {
                emitted.push(LiveEvent::Weather(Some(w)));
            }
        }
        for event in emitted {
            tracing::debug!(event = event.name(), "live state changed");
            // no subscribers is fine
            let _ = self.events.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    pub fn weather(&self) -> Option<String> {
        lock(&self.state).weather.weather.clone()
    }

    pub fn shops(&self) -> Option<SlimShops> {
        shop::simplify(&lock(&self.state).shops)
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let state = lock(&self.state);
        LiveSnapshot { weather: state.weather.weather.clone(), shops: shop::simplify(&state.shops) }
    }
}
