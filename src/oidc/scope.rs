//! Scope checks on validated claims.

use super::validator::ValidatedClaims;

/// Whether `claims` grant `required`.
///
/// The `scope` claim is split on single spaces and compared by exact string
/// equality. There is no wildcard or hierarchy: `read:products` does not
/// grant `read:product`, and an empty `required` is never granted.
pub fn has_scope(claims: &ValidatedClaims, required: &str) -> bool {
    if required.is_empty() {
        return false;
    }
    claims.scopes().any(|granted| granted == required)
}

impl ValidatedClaims {
    /// Granted permissions, in token order.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split(' ')
            .filter(|s| !s.is_empty())
    }

    pub fn has_scope(&self, required: &str) -> bool {
        has_scope(self, required)
    }
}
