//! Self-description for runtime components.
//!
//! Components that hold interesting state implement [`Diagnostics`] so that
//! operational tooling can collect a flat list of named entries without
//! knowing each component's internals.

/// One named diagnostic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub category: String,
    pub name: String,
    pub value: String,
}

impl DiagnosticEntry {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> DiagnosticEntry {
        DiagnosticEntry {
            category: category.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

pub trait Diagnostics {
    fn diagnostics(&self) -> Vec<DiagnosticEntry>;
}
