use super::patch::{apply_patch, is_truthy, LiveMessage};
use serde::Serialize;
use serde_json::{Map, Number, Value};

const SHOPS_PATH: &str = "/child/data/shops";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopItem {
    pub name: Value,
    pub stock: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimShop {
    pub seconds_until_restock: Value,
    pub items: Vec<ShopItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlimShops {
    pub seed: Option<SlimShop>,
    pub tool: Option<SlimShop>,
    pub egg: Option<SlimShop>,
    pub decor: Option<SlimShop>,
}

/// Raw shop tree as last seen on the wire; `None` until the first message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShopState {
    pub shops: Option<Value>,
}

/// Numeric coercion used by the game client for stock counts.
fn loose_number(v: Option<&Value>) -> f64 {
    match v {
        None | Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    }
}

fn item_name(item: &Map<String, Value>, shop_type: &str) -> Value {
    let field = match shop_type {
        "seed" => "species",
        "tool" => "toolId",
        "egg" => "eggId",
        "decor" => "decorId",
        _ => return Value::Null,
    };
    item.get(field).cloned().unwrap_or(Value::Null)
}

fn simplify_shop(shop: Option<&Value>, shop_type: &str) -> Option<SlimShop> {
    let shop = shop.filter(|s| is_truthy(s))?;
    let inventory = shop.get("inventory").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);

    let items = inventory
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|it| {
            let stock = loose_number(it.get("initialStock"));
            if stock.is_nan() || stock <= 0.0 {
                return None;
            }
            let name = item_name(it, shop_type);
            is_truthy(&name).then(|| ShopItem { name, stock: number_json(stock) })
        })
        .collect();

    Some(SlimShop {
        seconds_until_restock: number_json(loose_number(shop.get("secondsUntilRestock"))),
        items,
    })
}

/// Stock view of the four shops; `None` until shop data has arrived.
pub fn simplify(state: &ShopState) -> Option<SlimShops> {
    let shops = state.shops.as_ref().filter(|s| s.is_object())?;
    Some(SlimShops {
        seed: simplify_shop(shops.get("seed"), "seed"),
        tool: simplify_shop(shops.get("tool"), "tool"),
        egg: simplify_shop(shops.get("egg"), "egg"),
        decor: simplify_shop(shops.get("decor"), "decor"),
    })
}

/// Folds one message into the shop state. Returns the new stock view whenever
/// shop data was touched, changed or not.
pub fn reduce(mut state: ShopState, msg: &LiveMessage) -> (ShopState, Option<Option<SlimShops>>) {
    match msg {
        LiveMessage::Welcome { .. } => {
            let Some(shops) = msg.game_state().and_then(|g| g.get("shops")).filter(|s| is_truthy(s)) else {
                return (state, None);
            };
            state.shops = Some(shops.clone());
            let view = simplify(&state);
            (state, Some(view))
        }
        LiveMessage::PartialState { patches } => {
            let mut dirty = false;
            for p in patches {
                if p.path == SHOPS_PATH {
                    state.shops = Some(if p.value.is_null() { Value::Object(Map::new()) } else { p.value.clone() });
                    dirty = true;
                } else if let Some(rel) = p.path.strip_prefix(SHOPS_PATH).filter(|r| r.starts_with('/')) {
                    let shops = state.shops.get_or_insert_with(|| Value::Object(Map::new()));
                    apply_patch(shops, rel, p.value.clone(), p.op);
                    dirty = true;
                }
            }
            if dirty {
                let view = simplify(&state);
                (state, Some(view))
            } else {
                (state, None)
            }
        }
    }
}

/// Integral values inside the i64 range serialize without a fraction;
/// non-finite numbers become `null`.
fn number_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stock_numbers_keep_integer_shape() {
        assert_eq!(number_json(3.0), json!(3));
        assert_eq!(number_json(0.25), json!(0.25));
        assert_eq!(number_json(f64::NAN), Value::Null);
    }

    fn welcome() -> LiveMessage {
        LiveMessage::from_value(&json!({
            "type": "Welcome",
            "fullState": {"child": {"data": {"shops": {
                "seed": {"secondsUntilRestock": 30, "inventory": [
                    {"species": "Carrot", "initialStock": 5},
                    {"species": "Tomato", "initialStock": 0},
                    {"species": "", "initialStock": 3}
                ]},
                "egg": {"secondsUntilRestock": "12", "inventory": [{"eggId": "CommonEgg", "initialStock": "2"}]}
            }}}}
        }))
        .unwrap()
    }

    #[test]
    fn welcome_keeps_only_items_in_stock() {
        let (state, event) = reduce(ShopState::default(), &welcome());
        let view = event.unwrap().unwrap();
        let seed = view.seed.unwrap();
        assert_eq!(seed.seconds_until_restock, json!(30));
        assert_eq!(seed.items, vec![ShopItem { name: json!("Carrot"), stock: json!(5) }]);
        assert_eq!(view.egg.unwrap().items[0].stock, json!(2));
        assert!(view.tool.is_none());
        assert!(state.shops.is_some());
    }

    #[test]
    fn partial_patches_update_the_tree() {
        let (state, _) = reduce(ShopState::default(), &welcome());
        let patch = LiveMessage::from_value(&json!({
            "type": "PartialState",
            "patches": [{"path": "/child/data/shops/seed/inventory/1/initialStock", "value": 9, "op": "replace"}]
        }))
        .unwrap();
        let (_, event) = reduce(state, &patch);
        let seed = event.unwrap().unwrap().seed.unwrap();
        assert_eq!(seed.items.len(), 2);
        assert_eq!(seed.items[1].name, json!("Tomato"));
    }

    #[test]
    fn unrelated_patches_emit_nothing() {
        let patch = LiveMessage::from_value(&json!({
            "type": "PartialState",
            "patches": [{"path": "/child/data/shopsExtra", "value": 1}]
        }))
        .unwrap();
        let (state, event) = reduce(ShopState::default(), &patch);
        assert!(event.is_none());
        assert!(state.shops.is_none());
    }
}
