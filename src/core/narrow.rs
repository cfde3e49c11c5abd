//! MR-009: Schema-directed body narrowing.
//!
//! Walks the remaining traversal steps of a resource reference through the
//! resource's schema to find the most specific expression they reach. When
//! the path cannot be followed exactly, every reference under the current
//! body is returned instead, so no real dependency is missed.

use super::addrs::{InstanceKey, Reference, TraversalStep};
use super::body::{Block, Body};
use super::schema::{BlockSchema, NestingMode};
use tracing::trace;

/// References reachable from `body` along `steps`. Duplicates across
/// unioned block instances are kept.
pub fn narrow(body: &Body, schema: &BlockSchema, steps: &[TraversalStep]) -> Vec<Reference> {
    let Some((step, rest)) = steps.split_first() else {
        return block_wide(body);
    };
    let name = match step {
        TraversalStep::Attr(name) => name,
        TraversalStep::Index(key) => {
            trace!(%key, "index step at body level, using block-wide references");
            return block_wide(body);
        }
    };

    if let Some(attr) = schema.attributes.get(name) {
        if !rest.is_empty() && !attr.attr_type.is_traversable() {
            trace!(attribute = %name, extra = rest.len(), "steps past a scalar attribute ignored");
        }
        let Some(expr) = body.get(name) else {
            return Vec::new();
        };
        let (refs, _diags) = expr.references().into_parts();
        return refs;
    }

    if let Some(nested) = schema.block_types.get(name) {
        let (content, _diags) = body.partial_content(&schema.body_schema()).into_parts();
        let instances: Vec<&Block> = content.blocks_of_type(name).collect();
        let (selected, rest) = select_instances(nested.nesting_mode, instances, rest);
        trace!(block = %name, instances = selected.len(), "descending into nested block");
        return selected
            .into_iter()
            .flat_map(|b| narrow(&b.body, &nested.block, rest))
            .collect();
    }

    trace!(step = %name, "step matches no attribute or block, using block-wide references");
    block_wide(body)
}

/// Pick the block instances an index step addresses. Returns the steps left
/// after any consumed index.
fn select_instances<'b, 's>(
    mode: NestingMode,
    instances: Vec<&'b Block>,
    steps: &'s [TraversalStep],
) -> (Vec<&'b Block>, &'s [TraversalStep]) {
    let Some((TraversalStep::Index(key), rest)) = steps.split_first() else {
        return (instances, steps);
    };
    let picked: Vec<&Block> = match (mode, key) {
        (NestingMode::List, InstanceKey::Int(n)) => usize::try_from(*n)
            .ok()
            .and_then(|n| instances.get(n).copied())
            .into_iter()
            .collect(),
        (NestingMode::Map, InstanceKey::Str(k)) => instances
            .iter()
            .copied()
            .filter(|b| b.labels.first() == Some(k))
            .collect(),
        (NestingMode::Set, _) => return (instances, rest),
        _ => return (instances, steps),
    };
    if picked.is_empty() {
        (instances, rest)
    } else {
        (picked, rest)
    }
}

fn block_wide(body: &Body) -> Vec<Reference> {
    let (refs, _diags) = body.references().into_parts();
    refs
}
