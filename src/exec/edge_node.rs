//! Edge iterate node: walk the edges of one type for the current source.

use super::plan::{ExecState, NodeOutput, RelNode};
use super::{EdgeRow, ExecResult, RuntimeContext};
use crate::keys;
use crate::row::RowReader;
use crate::EdgeType;

/// Positions a key iterator on the `(part, vid, type)` prefix and decodes
/// every live edge row in key order, which is `(rank, dst)` order. The
/// type is signed; reverse iteration uses the negative id and its own key
/// prefix - a forward iterator is never reused for the reverse direction.
pub struct EdgeNode {
    pub etype: EdgeType,
}

impl EdgeNode {
    pub fn new(etype: EdgeType) -> EdgeNode {
        EdgeNode { etype }
    }
}

impl RelNode for EdgeNode {
    fn name(&self) -> &'static str {
        "EdgeNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let vid = state.vid()?;
        let Some(meta) = ctx.space.edge(self.etype) else {
            return Ok(NodeOutput::Edges(Vec::new()));
        };
        let vid_len = ctx.vid_len();
        let prefix = keys::edge_type_prefix(state.part, vid, self.etype);
        let mut iter = ctx.store.prefix(ctx.space.id, state.part, &prefix)?;
        let mut edges = Vec::new();
        while iter.valid() {
            ctx.check_killed()?;
            let key = iter.key();
            if !keys::is_edge_key(vid_len, key) {
                iter.advance();
                continue;
            }
            let (Some(src), Some(dst), Some(rank)) = (
                keys::edge_src(vid_len, key),
                keys::edge_dst(vid_len, key),
                keys::edge_rank(vid_len, key),
            ) else {
                iter.advance();
                continue;
            };
            let Ok(reader) = RowReader::open(&meta.schema, iter.value()) else {
                iter.advance();
                continue;
            };
            if reader.is_expired(ctx.ttl_override.as_ref(), ctx.now) {
                iter.advance();
                continue;
            }
            edges.push(EdgeRow {
                src: src.to_vec(),
                dst: dst.to_vec(),
                etype: self.etype,
                rank,
                props: reader.all(),
            });
            iter.advance();
        }
        Ok(NodeOutput::Edges(edges))
    }
}
