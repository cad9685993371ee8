//! Whole-partition scan nodes with cursor-based resumption.
//!
//! Both nodes iterate a partition's vertex (or edge) prefix starting at
//! the request cursor, honor the per-partition row limit, and report the
//! resumption cursor: when the iterator is still on a valid key after the
//! limit, that key is the cursor and `has_next` is true.

use super::plan::{ExecState, NodeOutput, RelNode};
use super::{find_prop, ExecResult, PropMap, RuntimeContext};
use crate::keys;
use crate::protocol::{ScanCursor, K_DST, K_RANK, K_SRC, K_TYPE};
use crate::row::RowReader;
use crate::value::{Row, Value};
use crate::{EdgeType, TagId};
use std::collections::HashMap;

/// One tag projected by a vertex scan; `props` is already expanded.
pub struct ScanTagSpec {
    pub tag_id: TagId,
    pub name: String,
    pub props: Vec<String>,
}

/// Scans the vertex prefix, emitting one row per distinct vid with at
/// least one live requested tag row: `[vid, prop..]` in spec order.
pub struct ScanVertexNode {
    pub tag_specs: Vec<ScanTagSpec>,
    pub limit: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl ScanVertexNode {
    fn emit(&self, vid: &[u8], tags: &HashMap<TagId, PropMap>, rows: &mut Vec<Row>) {
        if tags.is_empty() {
            return;
        }
        let mut values = Vec::with_capacity(1 + self.tag_specs.len());
        values.push(Value::Str(String::from_utf8_lossy(keys::trim_vid(vid)).into_owned()));
        for spec in &self.tag_specs {
            match tags.get(&spec.tag_id) {
                Some(props) => {
                    for name in &spec.props {
                        values.push(find_prop(props, name).unwrap_or(Value::Empty));
                    }
                }
                None => values.extend(spec.props.iter().map(|_| Value::Empty)),
            }
        }
        rows.push(Row::new(values));
    }
}

impl RelNode for ScanVertexNode {
    fn name(&self) -> &'static str {
        "ScanVertexNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let vid_len = ctx.vid_len();
        let prefix = keys::vertex_prefix(state.part);
        let start = state.cursor().map_or_else(|| prefix.clone(), <[u8]>::to_vec);
        let mut iter = ctx.store.range_with_prefix(ctx.space.id, state.part, &start, &prefix)?;

        let mut rows: Vec<Row> = Vec::new();
        let mut current_vid: Option<Vec<u8>> = None;
        let mut current_tags: HashMap<TagId, PropMap> = HashMap::new();
        let mut cursor = ScanCursor::default();

        if self.limit <= 0 {
            if iter.valid() {
                cursor.has_next = true;
                cursor.next_cursor = Some(iter.key().to_vec());
            }
            return Ok(NodeOutput::Scan { rows, cursor });
        }

        while iter.valid() {
            ctx.check_killed()?;
            let key = iter.key().to_vec();
            let (Some(vid), Some(tag_id)) =
                (keys::vertex_vid(vid_len, &key), keys::vertex_tag(vid_len, &key))
            else {
                iter.advance();
                continue;
            };
            if current_vid.as_deref() != Some(vid) {
                if let Some(done) = current_vid.take() {
                    self.emit(&done, &current_tags, &mut rows);
                    current_tags.clear();
                    if rows.len() as i64 >= self.limit {
                        cursor.has_next = true;
                        cursor.next_cursor = Some(key);
                        return Ok(NodeOutput::Scan { rows, cursor });
                    }
                }
                current_vid = Some(vid.to_vec());
            }
            let requested = self.tag_specs.iter().any(|s| s.tag_id == tag_id);
            if requested {
                if let Some(meta) = ctx.space.tag(tag_id) {
                    if let Ok(reader) = RowReader::open(&meta.schema, iter.value()) {
                        let live = !reader.is_expired(ctx.ttl_override.as_ref(), ctx.now)
                            && reader.visible_in(self.start_time, self.end_time);
                        if live {
                            current_tags.insert(tag_id, reader.all());
                        }
                    }
                }
            }
            iter.advance();
        }
        if let Some(done) = current_vid.take() {
            self.emit(&done, &current_tags, &mut rows);
        }
        cursor.has_next = false;
        Ok(NodeOutput::Scan { rows, cursor })
    }
}

/// One edge type projected by an edge scan; `props` already expanded,
/// synthetic key columns allowed.
pub struct ScanEdgeSpec {
    pub etype: EdgeType,
    pub name: String,
    pub props: Vec<String>,
}

/// Scans the edge prefix, emitting one row per live edge of a requested
/// type. Columns are the concatenation of every spec's projections; a
/// row carries values for its own type and `Empty` elsewhere.
pub struct ScanEdgeNode {
    pub edge_specs: Vec<ScanEdgeSpec>,
    pub limit: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl RelNode for ScanEdgeNode {
    fn name(&self) -> &'static str {
        "ScanEdgeNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let vid_len = ctx.vid_len();
        let prefix = keys::edge_prefix(state.part);
        let start = state.cursor().map_or_else(|| prefix.clone(), <[u8]>::to_vec);
        let mut iter = ctx.store.range_with_prefix(ctx.space.id, state.part, &start, &prefix)?;

        let mut rows: Vec<Row> = Vec::new();
        let mut cursor = ScanCursor::default();

        if self.limit <= 0 {
            if iter.valid() {
                cursor.has_next = true;
                cursor.next_cursor = Some(iter.key().to_vec());
            }
            return Ok(NodeOutput::Scan { rows, cursor });
        }

        while iter.valid() {
            ctx.check_killed()?;
            if rows.len() as i64 >= self.limit {
                cursor.has_next = true;
                cursor.next_cursor = Some(iter.key().to_vec());
                return Ok(NodeOutput::Scan { rows, cursor });
            }
            let key = iter.key();
            if !keys::is_edge_key(vid_len, key) {
                iter.advance();
                continue;
            }
            let etype = keys::edge_type(vid_len, key).unwrap_or(0);
            let Some(spec_idx) = self.edge_specs.iter().position(|s| s.etype == etype) else {
                iter.advance();
                continue;
            };
            let Some(meta) = ctx.space.edge(etype) else {
                iter.advance();
                continue;
            };
            let Ok(reader) = RowReader::open(&meta.schema, iter.value()) else {
                iter.advance();
                continue;
            };
            if reader.is_expired(ctx.ttl_override.as_ref(), ctx.now)
                || !reader.visible_in(self.start_time, self.end_time)
            {
                iter.advance();
                continue;
            }
            let props = reader.all();
            let src = keys::edge_src(vid_len, key).unwrap_or_default();
            let dst = keys::edge_dst(vid_len, key).unwrap_or_default();
            let rank = keys::edge_rank(vid_len, key).unwrap_or_default();

            let mut values = Vec::new();
            for (idx, spec) in self.edge_specs.iter().enumerate() {
                if idx == spec_idx {
                    for name in &spec.props {
                        values.push(match name.as_str() {
                            K_SRC => Value::Str(
                                String::from_utf8_lossy(keys::trim_vid(src)).into_owned(),
                            ),
                            K_DST => Value::Str(
                                String::from_utf8_lossy(keys::trim_vid(dst)).into_owned(),
                            ),
                            K_RANK => Value::Int(rank),
                            K_TYPE => Value::Int(i64::from(etype)),
                            prop => find_prop(&props, prop).unwrap_or(Value::Empty),
                        });
                    }
                } else {
                    values.extend(spec.props.iter().map(|_| Value::Empty));
                }
            }
            rows.push(Row::new(values));
            iter.advance();
        }
        cursor.has_next = false;
        Ok(NodeOutput::Scan { rows, cursor })
    }
}
