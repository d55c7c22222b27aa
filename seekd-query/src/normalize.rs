//! Expansion of free-text parts into structured parts.

use crate::parser::QueryStringParser;
use crate::types::{PartKind, Query, QueryPart};

/// Replace every human part of `query` with the parts `parser` produces for
/// it, including human parts nested inside or-groups.
///
/// Expansions are spliced in at the position of the part they replace, so
/// structured parts keep their relative order. A nested expansion stays
/// inside its or-group. A query without human parts is left untouched.
/// Returns the number of human parts that were expanded.
pub fn normalize(query: &mut Query, parser: &dyn QueryStringParser) -> usize {
    if !query.has_human_parts() {
        return 0;
    }

    let mut expanded = 0;
    let parts = expand(query.parts(), parser, &mut expanded);
    tracing::trace!(expanded, parts = parts.len(), "normalized query");
    query.set_parts(parts);
    expanded
}

fn expand(
    parts: &[QueryPart],
    parser: &dyn QueryStringParser,
    expanded: &mut usize,
) -> Vec<QueryPart> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match &part.kind {
            PartKind::Human { text } => {
                *expanded += 1;
                out.extend(parser.parse(text));
            }
            PartKind::Or { parts: group } if part.contains_human() => {
                out.push(QueryPart {
                    logic: part.logic,
                    kind: PartKind::Or {
                        parts: expand(group, parser, expanded),
                    },
                });
            }
            _ => out.push(part.clone()),
        }
    }
    out
}
