//! Join resolution for relation properties
//!
//! Every relation, whatever its cardinality, reduces to one of two physical shapes:
//! a direct column equality between parent and child tables, or a hop through a pivot table.
//! Column-count symmetry is checked here, so callers that obtain a `JoinSpec` can zip column
//! lists without further checks.

use super::entity::{check_column_count, EntityMetadata, EntityProperty, ReferenceKind};
use super::errors::MetadataError;

/// Physical correlation between a parent row and the rows of a related entity
#[derive(Debug, Clone, PartialEq)]
pub enum JoinSpec {
    /// `child.child_columns[i] = parent.parent_columns[i]`
    Direct {
        parent_columns: Vec<String>,
        child_columns: Vec<String>,
    },
    /// `child.child_columns IN (SELECT pivot_child_columns FROM pivot_table
    ///  WHERE pivot_parent_columns = parent.parent_columns)`
    Pivot {
        pivot_table: String,
        parent_columns: Vec<String>,
        pivot_parent_columns: Vec<String>,
        pivot_child_columns: Vec<String>,
        child_columns: Vec<String>,
    },
}

/// Resolve how `parent.property` correlates with rows of `child`
pub fn resolve_join(
    parent: &EntityMetadata,
    property: &EntityProperty,
    child: &EntityMetadata,
) -> Result<JoinSpec, MetadataError> {
    match property.reference {
        ReferenceKind::Scalar => Err(MetadataError::incomplete_relation(
            &parent.name,
            &property.name,
            "reference kind (property is scalar)",
        )),
        ReferenceKind::ManyToOne => owning_singular(parent, property, child),
        ReferenceKind::OneToOne if property.mapped_by.is_none() => {
            owning_singular(parent, property, child)
        }
        ReferenceKind::OneToOne | ReferenceKind::OneToMany => {
            let mapped_by = property.mapped_by.as_deref().ok_or_else(|| {
                MetadataError::incomplete_relation(&parent.name, &property.name, "mappedBy")
            })?;
            let owner = mapped_owner(parent, child, mapped_by)?;
            if !owner.is_owning_singular() {
                return Err(MetadataError::incomplete_relation(
                    &child.name,
                    &owner.name,
                    "owning many-to-one or one-to-one reference",
                ));
            }
            if owner.join_columns.is_empty() {
                return Err(MetadataError::incomplete_relation(
                    &child.name,
                    &owner.name,
                    "join columns",
                ));
            }
            let referenced = if owner.referenced_columns.is_empty() {
                &parent.primary_keys
            } else {
                &owner.referenced_columns
            };
            check_column_count(
                &child.name,
                &owner.name,
                "join columns",
                referenced.len(),
                owner.join_columns.len(),
            )?;
            Ok(JoinSpec::Direct {
                parent_columns: referenced.clone(),
                child_columns: owner.join_columns.clone(),
            })
        }
        ReferenceKind::ManyToMany => match property.mapped_by.as_deref() {
            None => pivot(parent, property, child, false),
            Some(mapped_by) => {
                let owner = mapped_owner(parent, child, mapped_by)?;
                if owner.reference != ReferenceKind::ManyToMany || owner.mapped_by.is_some() {
                    return Err(MetadataError::incomplete_relation(
                        &child.name,
                        &owner.name,
                        "owning many-to-many reference",
                    ));
                }
                pivot(child, owner, parent, true)
            }
        },
    }
}

/// The property an inverse relation is `mapped_by` must point back at the inverse side's entity
fn mapped_owner<'c>(
    parent: &EntityMetadata,
    child: &'c EntityMetadata,
    mapped_by: &str,
) -> Result<&'c EntityProperty, MetadataError> {
    let owner = child.require_property(mapped_by)?;
    if owner.type_name != parent.name {
        return Err(MetadataError::incomplete_relation(
            &child.name,
            &owner.name,
            "reference back to the mapped entity",
        ));
    }
    Ok(owner)
}

fn owning_singular(
    parent: &EntityMetadata,
    property: &EntityProperty,
    child: &EntityMetadata,
) -> Result<JoinSpec, MetadataError> {
    if property.join_columns.is_empty() {
        return Err(MetadataError::incomplete_relation(
            &parent.name,
            &property.name,
            "join columns",
        ));
    }
    let referenced = if property.referenced_columns.is_empty() {
        &child.primary_keys
    } else {
        &property.referenced_columns
    };
    check_column_count(
        &parent.name,
        &property.name,
        "join columns",
        referenced.len(),
        property.join_columns.len(),
    )?;
    Ok(JoinSpec::Direct {
        parent_columns: property.join_columns.clone(),
        child_columns: referenced.clone(),
    })
}

/// Build the pivot hop for the owning side `owner.property -> target`.
/// `swapped` is set when the request comes from the inverse side (target -> owner).
fn pivot(
    owner: &EntityMetadata,
    property: &EntityProperty,
    target: &EntityMetadata,
    swapped: bool,
) -> Result<JoinSpec, MetadataError> {
    let pivot_table = property.pivot_table.clone().ok_or_else(|| {
        MetadataError::incomplete_relation(&owner.name, &property.name, "pivot table")
    })?;
    check_column_count(
        &owner.name,
        &property.name,
        "pivot join columns",
        owner.primary_keys.len(),
        property.join_columns.len(),
    )?;
    check_column_count(
        &owner.name,
        &property.name,
        "pivot inverse join columns",
        target.primary_keys.len(),
        property.inverse_join_columns.len(),
    )?;

    if swapped {
        Ok(JoinSpec::Pivot {
            pivot_table,
            parent_columns: target.primary_keys.clone(),
            pivot_parent_columns: property.inverse_join_columns.clone(),
            pivot_child_columns: property.join_columns.clone(),
            child_columns: owner.primary_keys.clone(),
        })
    } else {
        Ok(JoinSpec::Pivot {
            pivot_table,
            parent_columns: owner.primary_keys.clone(),
            pivot_parent_columns: property.join_columns.clone(),
            pivot_child_columns: property.inverse_join_columns.clone(),
            child_columns: target.primary_keys.clone(),
        })
    }
}
