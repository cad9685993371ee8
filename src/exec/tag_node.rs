//! Tag read node: fetch one tag row of the current source vertex.

use super::plan::{ExecState, NodeOutput, RelNode};
use super::{ExecResult, PropMap, RuntimeContext};
use crate::keys;
use crate::row::RowReader;
use crate::TagId;

/// Reads the `(part, vid, tag)` row and decodes every property, making
/// them available both for projection and for filter evaluation. Output
/// is `TagRow(None)` when the vertex lacks the tag, the row is
/// TTL-expired, or the vertex does not exist at all.
pub struct TagNode {
    pub tag_id: TagId,
    pub tag_name: String,
}

impl TagNode {
    pub fn new(tag_id: TagId, tag_name: &str) -> TagNode {
        TagNode { tag_id, tag_name: tag_name.to_string() }
    }
}

impl RelNode for TagNode {
    fn name(&self) -> &'static str {
        "TagNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        ctx.check_killed()?;
        let vid = state.vid()?;
        let Some(meta) = ctx.space.tag(self.tag_id) else {
            return Ok(NodeOutput::TagRow(None));
        };
        let key = keys::vertex_key(state.part, vid, self.tag_id);
        let Some(blob) = ctx.store.get(ctx.space.id, state.part, &key)? else {
            return Ok(NodeOutput::TagRow(None));
        };
        let Ok(reader) = RowReader::open(&meta.schema, &blob) else {
            // decodable by another version of us, not by this one: skip
            return Ok(NodeOutput::TagRow(None));
        };
        if reader.is_expired(ctx.ttl_override.as_ref(), ctx.now) {
            return Ok(NodeOutput::TagRow(None));
        }
        let props: PropMap = reader.all();
        Ok(NodeOutput::TagRow(Some(props)))
    }
}
