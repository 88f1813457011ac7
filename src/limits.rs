use std::collections::HashMap;

use serde::Serialize;

use crate::config::QueryLimits;
use crate::error::{LimitKind, PlanError};
use crate::query_planner::Selection;

/// List length assumed for complexity scoring when `max_array_size` is unset.
pub const DEFAULT_ASSUMED_LIST_SIZE: u64 = 10;

/// Static cost of a planned operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlanCost {
    /// Deepest field nesting; root fields sit at depth 1.
    pub depth: u32,
    /// Widest single selection set, fragments merged into their level.
    pub fields: u32,
    /// Aliased fields across the whole operation.
    pub aliases: u32,
    pub complexity: u64,
}

#[derive(Clone, Copy, Default)]
struct Level {
    /// Fields merged into this selection set.
    fields: u32,
    /// Widest selection set at or below this one.
    widest: u32,
    depth: u32,
    aliases: u32,
    complexity: u64,
}

pub fn assumed_list_size(limits: &QueryLimits) -> u64 {
    match limits.max_array_size {
        0 => DEFAULT_ASSUMED_LIST_SIZE,
        n => u64::from(n),
    }
}

/// Measures a selection tree. A field costs its weight plus the cost of its
/// children, the children being multiplied by the assumed list size when the
/// field is list-typed.
///
/// Fragment selection sets are shared between their spreads, so each one is
/// measured once and its cost reused. Counters saturate.
pub fn measure(selection_set: &[Selection], list_size: u64) -> PlanCost {
    let root = walk(selection_set, list_size, &mut HashMap::new());
    PlanCost {
        depth: root.depth,
        fields: root.widest,
        aliases: root.aliases,
        complexity: root.complexity,
    }
}

fn walk(
    selection_set: &[Selection],
    list_size: u64,
    measured: &mut HashMap<*const Selection, Level>,
) -> Level {
    let mut level = Level::default();
    for selection in selection_set {
        match selection {
            Selection::Field(field) => {
                let nested = walk(&field.selection_set, list_size, measured);
                level.fields = level.fields.saturating_add(1);
                level.widest = level.widest.max(nested.widest);
                level.depth = level.depth.max(nested.depth.saturating_add(1));
                level.aliases = level
                    .aliases
                    .saturating_add(u32::from(field.alias.is_some()))
                    .saturating_add(nested.aliases);
                let multiplier = if field.ty.is_list() { list_size } else { 1 };
                level.complexity = level
                    .complexity
                    .saturating_add(field.complexity)
                    .saturating_add(nested.complexity.saturating_mul(multiplier));
            }
            Selection::Fragment(fragment) => {
                let key = fragment.selection_set.as_ptr();
                let nested = match measured.get(&key) {
                    Some(level) => *level,
                    None => {
                        let level = walk(&fragment.selection_set, list_size, measured);
                        measured.insert(key, level);
                        level
                    }
                };
                level.fields = level.fields.saturating_add(nested.fields);
                level.widest = level.widest.max(nested.widest);
                level.depth = level.depth.max(nested.depth);
                level.aliases = level.aliases.saturating_add(nested.aliases);
                level.complexity = level.complexity.saturating_add(nested.complexity);
            }
        }
    }
    level.widest = level.widest.max(level.fields);
    level
}

/// Checks depth, fields, aliases and complexity in that order. Zero limits
/// are unbounded.
pub fn check(cost: &PlanCost, limits: &QueryLimits) -> Result<(), PlanError> {
    let checks = [
        (LimitKind::Depth, u64::from(cost.depth), u64::from(limits.max_depth)),
        (LimitKind::Fields, u64::from(cost.fields), u64::from(limits.max_fields)),
        (LimitKind::Aliases, u64::from(cost.aliases), u64::from(limits.max_aliases)),
        (LimitKind::Complexity, cost.complexity, limits.max_complexity),
    ];
    for (limit, measured, max) in checks {
        if max > 0 && measured > max {
            tracing::warn!(%limit, measured, max, "request exceeded operation limits");
            return Err(PlanError::QueryTooComplex {
                limit,
                measured,
                max,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use crate::query_planner::{PlannedField, PlannedFragment};
    use crate::types::TypeRef;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn field(name: &str, ty: &str, children: Vec<Selection>) -> Selection {
        Selection::Field(PlannedField {
            name: name.to_string(),
            alias: None,
            arguments: Vec::new(),
            ty: ty.parse::<TypeRef>().unwrap(),
            complexity: 1,
            selection_set: children,
            location: Location { line: 1, column: 1 },
            conditions: Vec::new(),
        })
    }

    fn aliased(alias: &str, selection: Selection) -> Selection {
        match selection {
            Selection::Field(mut f) => {
                f.alias = Some(alias.to_string());
                Selection::Field(f)
            }
            other => other,
        }
    }

    #[test]
    fn measures_depth_width_and_aliases() {
        let plan = vec![
            field(
                "widgets",
                "[Widget!]!",
                vec![field("id", "Int!", vec![]), field("name", "String", vec![])],
            ),
            aliased("other", field("widget", "Widget", vec![field("id", "Int!", vec![])])),
        ];
        let cost = measure(&plan, 10);
        assert_eq!(
            cost,
            PlanCost {
                depth: 2,
                fields: 2,
                aliases: 1,
                // widgets: 1 + 2 * 10, widget: 1 + 1
                complexity: 23,
            }
        );
    }

    #[test]
    fn fragments_merge_into_their_level() {
        let plan = vec![field(
            "search",
            "SearchResult",
            vec![
                field("__typename", "String!", vec![]),
                Selection::Fragment(PlannedFragment {
                    type_condition: Some("Widget".into()),
                    selection_set: vec![field("id", "Int!", vec![]), field("name", "String", vec![])]
                        .into(),
                    conditions: Vec::new(),
                }),
            ],
        )];
        let cost = measure(&plan, 10);
        assert_eq!(cost.depth, 2);
        assert_eq!(cost.fields, 3);
    }

    #[test]
    fn shared_fragments_count_once_per_spread() {
        let shared: Arc<[Selection]> = vec![aliased("key", field("id", "Int!", vec![]))].into();
        let spread = |set: &Arc<[Selection]>| {
            Selection::Fragment(PlannedFragment {
                type_condition: Some("Widget".into()),
                selection_set: set.clone(),
                conditions: Vec::new(),
            })
        };
        let plan = vec![field(
            "widget",
            "Widget",
            vec![spread(&shared), spread(&shared), field("name", "String", vec![])],
        )];
        assert_eq!(
            measure(&plan, 10),
            PlanCost {
                depth: 2,
                fields: 3,
                aliases: 2,
                complexity: 4,
            }
        );
    }

    #[test]
    fn first_exceeded_limit_wins() {
        let cost = PlanCost {
            depth: 6,
            fields: 100,
            aliases: 0,
            complexity: 5,
        };
        let limits = QueryLimits {
            max_depth: 5,
            max_fields: 10,
            ..QueryLimits::unbounded()
        };
        assert_eq!(
            check(&cost, &limits),
            Err(PlanError::QueryTooComplex {
                limit: LimitKind::Depth,
                measured: 6,
                max: 5
            })
        );
        assert_eq!(check(&cost, &QueryLimits::unbounded()), Ok(()));
    }

    #[test]
    fn assumed_list_size_defaults_to_ten() {
        assert_eq!(assumed_list_size(&QueryLimits::unbounded()), 10);
        let limits = QueryLimits {
            max_array_size: 3,
            ..QueryLimits::unbounded()
        };
        assert_eq!(assumed_list_size(&limits), 3);
    }
}
