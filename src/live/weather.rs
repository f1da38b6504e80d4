use super::patch::{is_truthy, LiveMessage};
use serde_json::Value;

const WEATHER_PATH: &str = "/child/data/weather";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherState {
    pub weather: Option<String>,
}

/// Display name for a raw weather id; missing weather is clear skies.
pub fn format_weather(value: &Value) -> String {
    let raw = match value {
        v if !is_truthy(v) => return "Clear Skies".to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    match raw.to_lowercase().as_str() {
        "" | "sunny" => "Clear Skies".to_string(),
        "rain" => "Rain".to_string(),
        "frost" => "Snow".to_string(),
        "amber moon" => "Amber Moon".to_string(),
        "dawn" => "Dawn".to_string(),
        _ => raw,
    }
}

fn transition(mut state: WeatherState, raw: &Value) -> (WeatherState, Option<String>) {
    let next = format_weather(raw);
    if state.weather.as_deref() == Some(next.as_str()) {
        return (state, None);
    }
    state.weather = Some(next.clone());
    (state, Some(next))
}

/// Folds one message into the weather state, emitting only real changes.
pub fn reduce(state: WeatherState, msg: &LiveMessage) -> (WeatherState, Option<String>) {
    match msg {
        LiveMessage::Welcome { .. } => match msg.game_state().and_then(|g| g.get("weather")) {
            Some(raw) => transition(state, raw),
            None => (state, None),
        },
        LiveMessage::PartialState { patches } => match patches.iter().find(|p| p.path == WEATHER_PATH) {
            Some(p) => transition(state, &p.value),
            None => (state, None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weather_names_are_humanized() {
        assert_eq!(format_weather(&json!(null)), "Clear Skies");
        assert_eq!(format_weather(&json!("Sunny")), "Clear Skies");
        assert_eq!(format_weather(&json!(" frost ")), "Snow");
        assert_eq!(format_weather(&json!("Amber Moon")), "Amber Moon");
        assert_eq!(format_weather(&json!("Thunder")), "Thunder");
    }

    #[test]
    fn only_changes_are_emitted() {
        let msg = |w: &str| {
            LiveMessage::from_value(&json!({
                "type": "PartialState",
                "patches": [{"path": "/child/data/weather", "value": w}]
            }))
            .unwrap()
        };
        let (state, first) = reduce(WeatherState::default(), &msg("Rain"));
        assert_eq!(first.as_deref(), Some("Rain"));
        let (state, again) = reduce(state, &msg("rain"));
        assert_eq!(again, None);
        let (_, cleared) = reduce(state, &msg(""));
        assert_eq!(cleared.as_deref(), Some("Clear Skies"));
    }

    #[test]
    fn welcome_without_weather_key_is_ignored() {
        let msg = LiveMessage::from_value(&json!({
            "type": "Welcome",
            "fullState": {"child": {"data": {"shops": {}}}}
        }))
        .unwrap();
        assert_eq!(reduce(WeatherState::default(), &msg), (WeatherState::default(), None));
    }
}
