//! Terminfo capability table.
//!
//! Thin front over the on-disk terminfo database; lookup is by the
//! standard capability names (`cuu1`, `kcuu1`, `cols`, `am`, ...).

use terminfo::{Database, Value};

use crate::TermError;

#[derive(Debug)]
pub struct Capabilities {
    db: Database,
}

impl Capabilities {
    /// Load the entry for `term_type` from the terminfo database.
    pub fn load(term_type: &str) -> Result<Self, TermError> {
        let db = Database::from_name(term_type).map_err(|e| {
            TermError::Config(format!("unknown terminal type {term_type:?}: {e}"))
        })?;
        Ok(Self { db })
    }

    /// String capability, with the escape bytes rendered as text.
    pub fn string(&self, name: &str) -> Option<String> {
        match self.db.raw(name) {
            Some(Value::String(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<i32> {
        match self.db.raw(name) {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.db.raw(name), Some(Value::True))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_is_config_error() {
        let err = Capabilities::load("definitely-not-a-terminal").unwrap_err();
        assert!(matches!(err, TermError::Config(_)));
    }

    #[test]
    fn test_lookup_on_a_common_entry() {
        // Every terminfo installation carries the ancient "dumb" entry.
        let caps = Capabilities::load("dumb").expect("terminfo database present");
        assert_eq!(caps.number("cols"), Some(80));
        assert!(caps.flag("am"));
        assert!(caps.string("kcuu1").is_none());
    }
}
