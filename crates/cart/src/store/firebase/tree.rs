//! Local mirror of a streamed Firebase location.
//!
//! The streaming protocol sends `put` and `patch` events relative to the
//! subscribed location. Applying them to a JSON tree and re-reading the root
//! turns the event feed into full snapshots.

use serde_json::{Map, Value};

use crate::store::CartSnapshot;

/// JSON tree rooted at a user's cart.
#[derive(Debug, Default)]
pub struct CartTree {
    root: Value,
}

impl CartTree {
    /// Replace the value at `path` (`null` deletes it).
    pub fn put(&mut self, path: &str, data: Value) {
        let segments = segments(path);
        set_at(&mut self.root, &segments, data);
    }

    /// Replace each child of `path` named in `data`, leaving siblings alone.
    pub fn patch(&mut self, path: &str, data: Value) {
        let Value::Object(children) = data else {
            self.put(path, data);
            return;
        };

        let base = segments(path);
        for (key, value) in children {
            let mut child_path = base.clone();
            child_path.extend(key.split('/').filter(|s| !s.is_empty()));
            set_at(&mut self.root, &child_path, value);
        }
    }

    /// Full snapshot of the current tree.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::from_value(self.root.clone())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn set_at(node: &mut Value, path: &[&str], data: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = normalize(data);
        return;
    };

    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    let prune = {
        let child = map.entry((*head).to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        is_empty(child)
    };
    if prune {
        map.remove(*head);
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}

/// Firebase never stores empty containers, and renders integer-keyed
/// objects as arrays. Keep everything as objects so paths stay stable.
fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let map: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), normalize(item)))
                .filter(|(_, item)| !is_empty(item))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, item)| (key, normalize(item)))
                .filter(|(_, item)| !is_empty(item))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        scalar => scalar,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_root_put_replaces_everything() {
        let mut tree = CartTree::default();
        tree.put("/", json!({"1": {"quantity": 1}}));
        tree.put("/", json!({"2": {"quantity": 4}}));

        let snapshot = tree.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.entries().contains_key("2"));
    }

    #[test]
    fn test_child_put_and_delete() {
        let mut tree = CartTree::default();
        tree.put("/", Value::Null);
        tree.put("/3", json!({"quantity": 2}));
        assert_eq!(tree.snapshot().len(), 1);

        tree.put("/3", Value::Null);
        assert!(tree.snapshot().is_empty());
    }

    #[test]
    fn test_nested_put_updates_one_field() {
        let mut tree = CartTree::default();
        tree.put("/", json!({"3": {"quantity": 2, "title": "Hat"}}));
        tree.put("/3/quantity", json!(5));

        let snapshot = tree.snapshot();
        assert_eq!(snapshot.entries()["3"], json!({"quantity": 5, "title": "Hat"}));
    }

    #[test]
    fn test_patch_merges_children() {
        let mut tree = CartTree::default();
        tree.put("/", json!({"1": {"quantity": 1}, "2": {"quantity": 2}}));
        tree.patch("/", json!({"2": null, "3": {"quantity": 3}}));

        let keys: Vec<String> = tree.snapshot().entries().keys().cloned().collect();
        assert_eq!(keys, vec!["1".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_array_root_is_normalized() {
        let mut tree = CartTree::default();
        tree.put("/", json!([null, {"quantity": 1}]));
        tree.put("/1/quantity", json!(2));

        assert_eq!(tree.snapshot().entries()["1"], json!({"quantity": 2}));
    }

    #[test]
    fn test_array_put_with_holes_reconciles_by_index() {
        let record = |id: u64, quantity: u64| {
            json!({
                "id": id,
                "title": format!("Product {id}"),
                "price": 2.5,
                "image": "",
                "category": "misc",
                "quantity": quantity,
                "addedAt": "2025-01-01T00:00:00Z",
            })
        };
        let mut tree = CartTree::default();
        tree.put("/", json!([null, record(1, 2), null, record(3, 1)]));

        let result = crate::reconcile::reconcile(&tree.snapshot());
        assert!(!result.is_degraded());
        let keys: Vec<&str> = result.cart.items().map(|i| i.product_id.as_str()).collect();
        assert_eq!(keys, vec!["1", "3"]);

        tree.put("/3", Value::Null);
        let result = crate::reconcile::reconcile(&tree.snapshot());
        assert_eq!(result.cart.len(), 1);
        assert_eq!(result.cart.item_count(), 2);
    }
}
