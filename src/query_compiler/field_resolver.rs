//! Logical field name resolution
//!
//! Request keys are matched against an entity through an ordered list of lookup strategies;
//! the first strategy that finds something wins.

use crate::entity_catalog::{EntityMetadata, EntityProperty};

use super::custom_fields::{CustomField, CustomFieldRegistry};

/// What a request key resolved to
#[derive(Debug, Clone, Copy)]
pub enum ResolvedField<'e> {
    Property(&'e EntityProperty),
    Computed(&'e CustomField),
}

impl<'e> ResolvedField<'e> {
    /// Physical columns backing this field (for a relation: its owning-side join columns)
    pub fn columns(&self) -> &'e [String] {
        match self {
            ResolvedField::Property(property) => &property.columns,
            ResolvedField::Computed(field) => &field.required_columns,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, ResolvedField::Property(p) if p.is_relation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    /// Property with exactly this name
    Exact,
    /// Property whose name differs only in the case of the first letter
    FirstLetterCase,
    /// Computed field registered for the entity
    Computed,
}

const STRATEGIES: [LookupStrategy; 3] = [
    LookupStrategy::Exact,
    LookupStrategy::FirstLetterCase,
    LookupStrategy::Computed,
];

pub struct FieldResolver<'e> {
    entity: &'e EntityMetadata,
    custom_fields: Option<&'e CustomFieldRegistry>,
    case_fallback: bool,
}

impl<'e> FieldResolver<'e> {
    pub fn new(
        entity: &'e EntityMetadata,
        custom_fields: Option<&'e CustomFieldRegistry>,
        case_fallback: bool,
    ) -> Self {
        FieldResolver {
            entity,
            custom_fields,
            case_fallback,
        }
    }

    pub fn resolve(&self, key: &str) -> Option<ResolvedField<'e>> {
        STRATEGIES
            .iter()
            .find_map(|strategy| self.lookup(*strategy, key))
    }

    /// Qualified-column lookup used for ordering; relations cannot be ordered by
    pub fn scalar_columns(&self, key: &str) -> Option<&'e [String]> {
        match self.resolve(key)? {
            field if field.is_relation() => None,
            field => Some(field.columns()),
        }
    }

    fn lookup(&self, strategy: LookupStrategy, key: &str) -> Option<ResolvedField<'e>> {
        match strategy {
            LookupStrategy::Exact => self.entity.property(key).map(ResolvedField::Property),
            LookupStrategy::FirstLetterCase if self.case_fallback => {
                let toggled = toggle_first_letter(key)?;
                let property = self.entity.property(&toggled)?;
                log::debug!(
                    "{}: resolved '{}' as property '{}'",
                    self.entity.name,
                    key,
                    property.name
                );
                Some(ResolvedField::Property(property))
            }
            LookupStrategy::FirstLetterCase => None,
            LookupStrategy::Computed => self
                .custom_fields?
                .get(&self.entity.name, key)
                .map(ResolvedField::Computed),
        }
    }
}

fn toggle_first_letter(key: &str) -> Option<String> {
    let mut chars = key.chars();
    let first = chars.next()?;
    let toggled: String = if first.is_uppercase() {
        first.to_lowercase().collect()
    } else if first.is_lowercase() {
        first.to_uppercase().collect()
    } else {
        return None;
    };
    Some(toggled + chars.as_str())
}
