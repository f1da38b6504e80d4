use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    #[default]
    #[serde(other)]
    Replace,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatePatch {
    pub path: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub op: PatchOp,
}

/// The two room messages the relay cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Welcome { full_state: Value },
    PartialState { patches: Vec<StatePatch> },
}

impl LiveMessage {
    /// `None` for malformed JSON and every other message type.
    pub fn parse(raw: &str) -> Option<Self> {
        let msg: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&msg)
    }

    pub fn from_value(msg: &Value) -> Option<Self> {
        match msg.get("type")?.as_str()? {
            "Welcome" => {
                let full_state = msg.get("fullState").filter(|v| is_truthy(v))?.clone();
                Some(LiveMessage::Welcome { full_state })
            }
            "PartialState" => {
                let patches = msg
                    .get("patches")?
                    .as_array()?
                    .iter()
                    .filter_map(|p| serde_json::from_value(p.clone()).ok())
                    .collect();
                Some(LiveMessage::PartialState { patches })
            }
            _ => None,
        }
    }

    /// `fullState.child.data` of a welcome message.
    pub fn game_state(&self) -> Option<&Map<String, Value>> {
        match self {
            LiveMessage::Welcome { full_state } => full_state.get("child")?.get("data")?.as_object(),
            LiveMessage::PartialState { .. } => None,
        }
    }
}

pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_index(segment: &str) -> Option<usize> {
    segment.parse::<usize>().ok()
}

fn empty_container(next: &str) -> Value {
    if as_index(next).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Slot `i` of `items`, appending when `i` is one past the end. Anything
/// further out is ignored rather than padded.
fn slot_mut(items: &mut Vec<Value>, i: usize) -> Option<&mut Value> {
    if i == items.len() {
        items.push(Value::Null);
    }
    items.get_mut(i)
}

fn child_mut<'a>(cur: &'a mut Value, key: &str, next: &str) -> Option<&'a mut Value> {
    match cur {
        Value::Object(map) => {
            let slot = map.entry(key.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = empty_container(next);
            }
            Some(slot)
        }
        Value::Array(items) => {
            let slot = slot_mut(items, as_index(key)?)?;
            if slot.is_null() {
                *slot = empty_container(next);
            }
            Some(slot)
        }
        _ => None,
    }
}

/// Applies one `/`-separated patch, creating missing parents as objects or
/// arrays depending on the following segment. Paths through scalars are ignored.
pub fn apply_patch(root: &mut Value, path: &str, value: Value, op: PatchOp) {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut cur = root;
    for (i, key) in parents.iter().enumerate() {
        let next = parts[i + 1];
        match child_mut(cur, key, next) {
            Some(child) => cur = child,
            None => return,
        }
    }

    match (cur, op) {
        (Value::Array(items), PatchOp::Remove) => {
            if let Some(i) = as_index(last).filter(|i| *i < items.len()) {
                items.remove(i);
            }
        }
        (Value::Object(map), PatchOp::Remove) => {
            map.shift_remove(*last);
        }
        (Value::Array(items), _) => {
            if let Some(slot) = as_index(last).and_then(|i| slot_mut(items, i)) {
                *slot = value;
            }
        }
        (Value::Object(map), _) => {
            map.insert(last.to_string(), value);
        }
        _ => {}
    }
}
