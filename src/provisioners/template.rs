//! `{{ }}` template expansion for provisioner arguments and template
//! provisioners.
//!
//! Templates are rendered with minijinja in strict mode: referencing a value
//! that is not in the context is an error instead of an empty string. Every
//! template can call `encode_secret_ref(secret, key)` to produce a secret
//! reference token.

use minijinja::{Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use super::{ProvisionError, ProvisionInput};
use crate::secrets::encode_secret_ref;

static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_function("encode_secret_ref", |secret: String, key: String| {
        encode_secret_ref(&secret, &key)
    });
    env
});

/// The context templates are rendered against.
pub fn template_data(input: &ProvisionInput) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("guid".into(), Value::from(input.resource_guid.clone()));
    data.insert("uid".into(), Value::from(input.resource_uid.clone()));
    data.insert("type".into(), Value::from(input.resource_type.clone()));
    data.insert("class".into(), Value::from(input.resource_class.clone()));
    data.insert("id".into(), Value::from(input.resource_id.clone()));
    data.insert("params".into(), Value::Object(input.resource_params.clone()));
    data.insert("metadata".into(), Value::Object(input.resource_metadata.clone()));
    data.insert("state".into(), Value::Object(input.resource_state.clone()));
    data.insert("shared".into(), Value::Object(input.shared_state.clone()));
    data.insert(
        "source_workload".into(),
        Value::from(input.source_workload.clone()),
    );
    data.insert(
        "workload_services".into(),
        serde_json::to_value(&input.workload_services).unwrap_or(Value::Null),
    );
    data
}

/// Render one template string.
pub fn render(source: &str, data: &Map<String, Value>) -> Result<String, ProvisionError> {
    ENV.render_str(source, data)
        .map_err(|err| ProvisionError::Template {
            template: source.to_string(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Map<String, Value> {
        json!({
            "guid": "01ABC",
            "params": {"size": "large", "tags": ["a", "b"]},
            "state": {}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_renders_context_values() {
        assert_eq!(render("{{ guid }}-{{ params.size }}", &data()).unwrap(), "01ABC-large");
        assert_eq!(render("{{ params.tags | join(',') }}", &data()).unwrap(), "a,b");
        assert_eq!(render("plain", &data()).unwrap(), "plain");
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let err = render("{{ params.missing.deeper }}", &data()).unwrap_err();
        assert!(matches!(err, ProvisionError::Template { .. }));
        assert!(render("{{ nope }}", &data()).is_err());
    }

    #[test]
    fn test_encode_secret_ref_function() {
        let out = render("{{ encode_secret_ref('db-creds', 'password') }}", &data()).unwrap();
        assert_eq!(out, encode_secret_ref("db-creds", "password"));
    }
}
