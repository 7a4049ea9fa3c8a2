//! Settings for snapshot and restore passes.

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Fail the whole pass if any object is excluded or fails to restore,
    /// instead of carrying on without it.
    pub strict: bool,

    /// After restoring, capture every restored object again and report any
    /// whose restorable state differs from its record.
    pub verify_restore: bool,
}

impl Options {
    /// Parse options from JSON text. Missing settings take their defaults.
    pub fn from_json(text: &str) -> Result<Options, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[test]
fn test_defaults() {
    assert_eq!(Options::from_json("{}").unwrap(), Options::default());
    let options = Options::from_json(r#"{ "strict": true, "unknown": 1 }"#).unwrap();
    assert!(options.strict);
    assert!(!options.verify_restore);
    assert!(Options::from_json(r#"{ "strict": "yes" }"#).is_err());
}
