//! Runtime identity resolution against the catalog.

use crate::catalog::definition::{Catalog, VehicleDefinition};
use crate::error::XStreamError;

/// The host's two identity lookups. Either may return an empty string.
pub trait IdentitySource {
    /// Current author / studio of the loaded vehicle.
    fn author(&self) -> String;
    /// Current type code (e.g. ICAO designator) of the loaded vehicle.
    fn type_code(&self) -> String;
}

/// A fixed identity, for tests and replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIdentity {
    pub author: String,
    pub type_code: String,
}

impl StaticIdentity {
    pub fn new(author: impl Into<String>, type_code: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            type_code: type_code.into(),
        }
    }
}

impl IdentitySource for StaticIdentity {
    fn author(&self) -> String {
        self.author.clone()
    }

    fn type_code(&self) -> String {
        self.type_code.clone()
    }
}

/// Picks the definition for a runtime identity.
///
/// The first definition in catalog order whose author glob matches and
/// whose type-code globs contain at least one match wins.
pub struct IdentityMatcher<'a> {
    catalog: &'a Catalog,
}

impl<'a> IdentityMatcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve explicit identity strings.
    pub fn resolve(&self, author: &str, type_code: &str) -> Result<&'a VehicleDefinition, XStreamError> {
        let found = self
            .catalog
            .definitions()
            .iter()
            .find(|def| def.matches(author, type_code));

        match found {
            Some(def) => {
                tracing::debug!(author, type_code, definition = %def.label, "identity resolved");
                Ok(def)
            }
            None => Err(XStreamError::DefinitionNotFound {
                author: author.to_string(),
                type_code: type_code.to_string(),
            }),
        }
    }

    /// Query `source` and resolve its identity.
    pub fn resolve_current(
        &self,
        source: &dyn IdentitySource,
    ) -> Result<&'a VehicleDefinition, XStreamError> {
        self.resolve(&source.author(), &source.type_code())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::definition::{RegionLayout, SignatureRecord, VehicleRecord};

    fn vehicle(label: &str, author: &str, codes: &[&str]) -> VehicleRecord {
        VehicleRecord {
            label: Some(label.into()),
            author: author.into(),
            type_codes: codes.iter().map(|c| c.to_string()).collect(),
            signatures: vec![SignatureRecord {
                width: 64,
                height: 64,
                pattern: vec![1],
                regions: vec![RegionLayout {
                    name: "pfd".into(),
                    x: 0,
                    y: 0,
                    width: 32,
                    height: 32,
                }],
            }],
        }
    }

    #[test]
    fn airbus_family_matches() {
        let catalog = Catalog::from_records(vec![vehicle("a32x", "airbus*", &["A320", "A321"])]).unwrap();
        let matcher = IdentityMatcher::new(&catalog);

        assert!(matcher.resolve("airbusstudio", "A320").is_ok());
        assert!(matcher.resolve("airbusstudio", "A321").is_ok());
        let err = matcher.resolve("airbusstudio", "B738").unwrap_err();
        assert!(matches!(err, XStreamError::DefinitionNotFound { .. }));
        assert!(matcher.resolve("boeingworks", "A320").is_err());
    }

    #[test]
    fn first_definition_in_order_wins() {
        let catalog = Catalog::from_records(vec![
            vehicle("specific", "toliss", &["A32?"]),
            vehicle("fallback", "*", &["*"]),
        ])
        .unwrap();
        let matcher = IdentityMatcher::new(&catalog);

        assert_eq!(matcher.resolve("toliss", "A321").unwrap().label, "specific");
        assert_eq!(matcher.resolve("toliss", "A346").unwrap().label, "fallback");
        assert_eq!(matcher.resolve("", "").unwrap().label, "fallback");
    }

    #[test]
    fn empty_identity_without_wildcard_fails() {
        let catalog = Catalog::from_records(vec![vehicle("a32x", "airbus*", &["A320"])]).unwrap();
        let matcher = IdentityMatcher::new(&catalog);
        assert!(matcher.resolve("", "").is_err());
    }

    #[test]
    fn resolves_from_identity_source() {
        let catalog = Catalog::from_records(vec![vehicle("a32x", "airbus*", &["A320"])]).unwrap();
        let matcher = IdentityMatcher::new(&catalog);
        let id = StaticIdentity::new("airbusstudio", "A320");
        assert_eq!(matcher.resolve_current(&id).unwrap().label, "a32x");
    }
}
