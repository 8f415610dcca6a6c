//! Named single objects fetched with `get_object`

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCache {
    name: String,
    object: Option<Value>,
    loading: bool,
}

impl ObjectCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: None,
            loading: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> Option<&Value> {
        self.object.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// `get_object` argument for this object
    pub fn load_request(&self) -> Value {
        json!({"config": {"name": self.name}})
    }

    /// Merge an update field by field. Anything that is not an object
    /// replaces the cached value outright.
    pub fn apply(&mut self, payload: &Value) {
        self.loading = false;
        match (self.object.as_mut(), payload) {
            (Some(Value::Object(current)), Value::Object(patch)) => {
                for (name, value) in patch {
                    current.insert(name.clone(), value.clone());
                }
            }
            _ => self.object = Some(payload.clone()),
        }
    }

    pub fn clear(&mut self) {
        self.object = None;
        self.loading = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_merge() {
        let mut cache = ObjectCache::new("house_rules");
        assert!(cache.is_loading());
        assert_eq!(cache.load_request(), json!({"config": {"name": "house_rules"}}));

        cache.apply(&json!({"quiet_hours": "22-7", "pets": false}));
        cache.apply(&json!({"pets": true}));
        assert_eq!(cache.object(), Some(&json!({"quiet_hours": "22-7", "pets": true})));
        assert!(!cache.is_loading());

        cache.apply(&json!("gone"));
        assert_eq!(cache.object(), Some(&json!("gone")));
    }
}
