use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Departments a scoped approver may decide for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub units: BTreeSet<String>,
}

impl Scope {
    pub fn new<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            units: units
                .into_iter()
                .map(Into::into)
                .map(|unit: String| unit.trim().to_owned())
                .filter(|unit| !unit.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.units.contains(unit)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Caller identity as supplied by the session provider. Trusted as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
    pub scope: Option<Scope>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { id: id.into(), role: role.into(), scope: None }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Actor,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(actor: Actor, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Scope};

    #[test]
    fn scope_ignores_blank_units() {
        let scope = Scope::new(["mali-hizmetler", " ", "strateji "]);

        assert_eq!(scope.units.len(), 2);
        assert!(scope.contains("strateji"));
        assert!(!scope.contains(""));
    }

    #[test]
    fn actor_scope_is_optional() {
        let actor = Actor::new("u-7", "finance");
        assert!(actor.scope.is_none());

        let scoped = actor.with_scope(Scope::new(["insan-kaynaklari"]));
        assert!(scoped.scope.as_ref().is_some_and(|scope| scope.contains("insan-kaynaklari")));
    }
}
