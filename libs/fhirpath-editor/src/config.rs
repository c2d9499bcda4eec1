use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreOptions {
    /// If `false`, binding edits are ignored and only the main expression
    /// can be changed.
    pub allow_bindings: bool,
    /// If `true`, the program is the body of a lambda argument. Its `$this`
    /// is only known at call time, so values are never evaluated.
    pub is_lambda: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            allow_bindings: true,
            is_lambda: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_options() {
        let options: StoreOptions = serde_json::from_value(json!({ "isLambda": true })).unwrap();
        assert!(options.allow_bindings);
        assert!(options.is_lambda);
        assert_eq!(
            serde_json::from_value::<StoreOptions>(json!({})).unwrap(),
            StoreOptions::default()
        );
    }
}
