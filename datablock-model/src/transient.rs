use crate::error::{AssignError, PermissionDenied};
use crate::handler::NoEntities;
use crate::schema::SchemaRegistry;
use crate::value::{PropertyBag, Value};

/// Values of a non-persistent struct such as an operator or UI-list row.
///
/// These live outside any store, so they can never hold entity references.
#[derive(Debug, Clone)]
pub struct TransientProperties {
    struct_name: String,
    values: PropertyBag,
}

impl TransientProperties {
    #[must_use]
    pub fn new(struct_name: impl Into<String>) -> Self {
        Self {
            struct_name: struct_name.into(),
            values: PropertyBag::new(),
        }
    }

    pub fn struct_name(&self) -> &str {
        &self.struct_name
    }

    pub fn set(
        &mut self,
        registry: &SchemaRegistry,
        key: &str,
        value: Value,
    ) -> Result<(), AssignError> {
        if value.contains_references() {
            return Err(PermissionDenied {
                owner: self.struct_name.clone(),
                property: key.to_string(),
                reason: "transient values cannot hold entity references".into(),
            }
            .into());
        }
        let value = registry.check_assignment(Some(&self.struct_name), key, value, &NoEntities)?;
        self.values.insert(key, value);
        Ok(())
    }

    /// The stored value, or the declared default when unset.
    pub fn get(&self, registry: &SchemaRegistry, key: &str) -> Option<Value> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| registry.default_value(&self.struct_name, key))
    }

    pub fn has_property(&self, registry: &SchemaRegistry, key: &str) -> bool {
        self.values.contains_key(key) || registry.has_property(&self.struct_name, key)
    }
}
