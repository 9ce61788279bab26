//! Identity specification and local id resolution.
//!
//! # Responsibility
//! - Describe which fields identify a record of a model.
//! - Fold resolved identity components into a deterministic local id.
//!
//! # Invariants
//! - `local_id = "<Model>,<resolved>"`.
//! - Relation components render as `(<target local id>)`, so identities nest.
//! - AND groups need every operand; OR groups need at least one.

/// Declared identity of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Single identifying field.
    Field(String),
    /// Every operand must resolve.
    And(Vec<Identity>),
    /// At least one operand must resolve; resolved operands are all kept.
    Or(Vec<Identity>),
}

impl Identity {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn and(operands: impl IntoIterator<Item = Identity>) -> Self {
        Self::And(operands.into_iter().collect())
    }

    pub fn or(operands: impl IntoIterator<Item = Identity>) -> Self {
        Self::Or(operands.into_iter().collect())
    }

    /// Returns the field name when the identity is a single field.
    pub fn single_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Returns every field referenced by this identity, in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Field(name) => out.push(name.as_str()),
            Self::And(operands) | Self::Or(operands) => {
                for operand in operands {
                    operand.collect_fields(out);
                }
            }
        }
    }

    /// Resolves the identity against `component`, which renders one field.
    ///
    /// Returns `None` when the identity cannot be resolved from the input.
    pub fn resolve<F>(&self, component: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Field(name) => component(name),
            Self::And(operands) => {
                let parts = operands
                    .iter()
                    .map(|operand| operand.resolve_operand(component))
                    .collect::<Option<Vec<_>>>()?;
                Some(parts.join(" AND "))
            }
            Self::Or(operands) => {
                let parts = operands
                    .iter()
                    .filter_map(|operand| operand.resolve_operand(component))
                    .collect::<Vec<_>>();
                if parts.is_empty() {
                    return None;
                }
                Some(parts.join(" OR "))
            }
        }
    }

    fn resolve_operand<F>(&self, component: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = self.resolve(component)?;
        match self {
            Self::Field(_) => Some(resolved),
            Self::And(_) | Self::Or(_) => Some(format!("({resolved})")),
        }
    }
}

/// Joins a model name and a resolved identity into a local id.
pub fn local_id(model: &str, resolved: &str) -> String {
    format!("{model},{resolved}")
}

/// Renders a relation component from the related record's local id.
pub fn relation_fragment(target_local_id: &str) -> String {
    format!("({target_local_id})")
}

#[cfg(test)]
mod tests {
    use super::{local_id, relation_fragment, Identity};
    use std::collections::BTreeMap;

    fn lookup(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        move |field: &str| map.get(field).cloned()
    }

    #[test]
    fn single_field_resolves_to_raw_value() {
        let identity = Identity::field("id");
        let resolved = identity.resolve(&lookup(&[("id", "42")]));
        assert_eq!(resolved.as_deref(), Some("42"));
        assert_eq!(local_id("Person", "42"), "Person,42");
    }

    #[test]
    fn and_requires_every_operand() {
        let identity = Identity::and([Identity::field("thread"), Identity::field("id")]);
        assert_eq!(
            identity
                .resolve(&lookup(&[("thread", "(Thread,1)"), ("id", "7")]))
                .as_deref(),
            Some("(Thread,1) AND 7")
        );
        assert_eq!(identity.resolve(&lookup(&[("id", "7")])), None);
    }

    #[test]
    fn or_keeps_resolved_operands_only() {
        let identity = Identity::or([Identity::field("email"), Identity::field("phone")]);
        assert_eq!(
            identity.resolve(&lookup(&[("phone", "555")])).as_deref(),
            Some("555")
        );
        assert_eq!(identity.resolve(&lookup(&[])), None);
    }

    #[test]
    fn nested_groups_are_bracketed() {
        let identity = Identity::and([
            Identity::field("model"),
            Identity::or([Identity::field("id"), Identity::field("code")]),
        ]);
        let resolved = identity.resolve(&lookup(&[("model", "res"), ("id", "3"), ("code", "x")]));
        assert_eq!(resolved.as_deref(), Some("res AND (3 OR x)"));
        assert_eq!(identity.fields(), vec!["model", "id", "code"]);
    }

    #[test]
    fn relation_fragment_wraps_target_local_id() {
        assert_eq!(relation_fragment("Person,1"), "(Person,1)");
    }
}
