//! Index scan and index output nodes.
//!
//! `IndexScanNode` turns column hints into one contiguous key interval
//! per partition and yields references to the underlying vertex or edge
//! keys. `IndexOutputNode` fetches and decodes the referenced rows,
//! evaluates the residual filter, and projects the return columns.

use super::plan::{ExecState, NodeId, NodeOutput, RelNode};
use super::{
    find_prop, EdgeRow, ExecError, ExecResult, IndexRef, RuntimeContext, StorageExprContext,
};
use crate::expr::{eval, Expression};
use crate::index::{hint_interval, IndexError, IndexItem};
use crate::keys;
use crate::protocol::{ColumnHint, ErrorCode, SchemaRef, K_DST, K_RANK, K_SRC, K_TAG, K_TYPE, K_VID};
use crate::row::RowReader;
use crate::value::{Row, Value};
use std::sync::Arc;

/// Walks the hinted interval of one index and parses each entry's tail
/// back into the referenced entity key.
pub struct IndexScanNode {
    pub index: Arc<IndexItem>,
    pub hints: Vec<ColumnHint>,
}

impl IndexScanNode {
    fn column_width(&self) -> usize {
        self.index
            .fields
            .iter()
            .map(|f| keys::index_value_width(f.dtype, f.str_len))
            .sum()
    }

    fn parse_tail(&self, vid_len: usize, tail: &[u8]) -> Option<IndexRef> {
        match self.index.schema {
            SchemaRef::Tag(_) => {
                let vid = keys::index_tail_vertex(vid_len, tail)?;
                Some(IndexRef::Vertex { vid: vid.to_vec() })
            }
            SchemaRef::Edge(_) => {
                let (src, rank, dst) = keys::index_tail_edge(vid_len, tail)?;
                Some(IndexRef::Edge { src: src.to_vec(), rank, dst: dst.to_vec() })
            }
        }
    }
}

impl RelNode for IndexScanNode {
    fn name(&self) -> &'static str {
        "IndexScanNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let interval = match hint_interval(state.part, &self.index, &self.hints) {
            Ok(Some(interval)) => interval,
            Ok(None) => return Ok(NodeOutput::Refs(Vec::new())),
            Err(IndexError::BoolRangeScan) => {
                return Err(ExecError::Semantic(IndexError::BoolRangeScan.to_string()))
            }
            Err(_) => return Err(ExecError::Code(ErrorCode::IndexNotFound)),
        };
        let mut iter = ctx.store.range(
            ctx.space.id,
            state.part,
            &interval.begin,
            interval.end.as_deref(),
        )?;
        let width = self.column_width();
        let vid_len = ctx.vid_len();
        let mut refs = Vec::new();
        while iter.valid() {
            ctx.check_killed()?;
            let key = iter.key();
            if let Some(body) = keys::index_body(key) {
                if keys::index_id_of(key) == Some(self.index.index_id) && body.len() >= width {
                    if let Some(entity) = self.parse_tail(vid_len, &body[width..]) {
                        refs.push(entity);
                    }
                }
            }
            iter.advance();
        }
        Ok(NodeOutput::Refs(refs))
    }
}

/// Fetches the rows behind index references, applies the residual filter,
/// and projects `return_columns` (synthetic key columns included).
pub struct IndexOutputNode {
    pub schema: SchemaRef,
    pub schema_name: String,
    pub return_columns: Vec<String>,
    pub residual: Option<Expression>,
    pub dep: NodeId,
}

impl RelNode for IndexOutputNode {
    fn name(&self) -> &'static str {
        "IndexOutputNode"
    }

    fn execute(&mut self, ctx: &RuntimeContext, state: &ExecState) -> ExecResult<NodeOutput> {
        let NodeOutput::Refs(refs) = &state.outputs[self.dep] else {
            return Ok(NodeOutput::Rows(Vec::new()));
        };
        let mut rows = Vec::with_capacity(refs.len());
        for entity in refs {
            ctx.check_killed()?;
            if let Some(row) = self.materialize(ctx, state, entity)? {
                rows.push(row);
            }
        }
        Ok(NodeOutput::Rows(rows))
    }
}

impl IndexOutputNode {
    fn materialize(
        &self,
        ctx: &RuntimeContext,
        state: &ExecState,
        entity: &IndexRef,
    ) -> ExecResult<Option<Row>> {
        match (self.schema, entity) {
            (SchemaRef::Tag(tag_id), IndexRef::Vertex { vid }) => {
                let Some(meta) = ctx.space.tag(tag_id) else {
                    return Err(ExecError::Code(ErrorCode::TagNotFound));
                };
                let key = keys::vertex_key(state.part, vid, tag_id);
                let Some(blob) = ctx.store.get(ctx.space.id, state.part, &key)? else {
                    // index entry outlived the row; not an error
                    return Ok(None);
                };
                let Ok(reader) = RowReader::open(&meta.schema, &blob) else {
                    return Ok(None);
                };
                if reader.is_expired(ctx.ttl_override.as_ref(), ctx.now) {
                    return Ok(None);
                }
                let props = reader.all();
                let tags = vec![(self.schema_name.clone(), Some(props.clone()))];
                if let Some(residual) = &self.residual {
                    let expr_ctx = StorageExprContext {
                        ctx,
                        part: state.part,
                        vid,
                        tags: &tags,
                        edge: None,
                        edge_name: "",
                    };
                    if !eval(residual, &expr_ctx)?.is_true() {
                        return Ok(None);
                    }
                }
                let values = self
                    .return_columns
                    .iter()
                    .map(|name| match name.as_str() {
                        K_VID => Value::Str(
                            String::from_utf8_lossy(keys::trim_vid(vid)).into_owned(),
                        ),
                        K_TAG => Value::Int(i64::from(tag_id)),
                        prop => find_prop(&props, prop).unwrap_or(Value::Empty),
                    })
                    .collect();
                Ok(Some(Row::new(values)))
            }
            (SchemaRef::Edge(etype), IndexRef::Edge { src, rank, dst }) => {
                let Some(meta) = ctx.space.edge(etype) else {
                    return Err(ExecError::Code(ErrorCode::EdgeNotFound));
                };
                let key = keys::edge_key(state.part, src, etype, *rank, dst);
                let Some(blob) = ctx.store.get(ctx.space.id, state.part, &key)? else {
                    return Ok(None);
                };
                let Ok(reader) = RowReader::open(&meta.schema, &blob) else {
                    return Ok(None);
                };
                if reader.is_expired(ctx.ttl_override.as_ref(), ctx.now) {
                    return Ok(None);
                }
                let edge = EdgeRow {
                    src: src.clone(),
                    dst: dst.clone(),
                    etype,
                    rank: *rank,
                    props: reader.all(),
                };
                if let Some(residual) = &self.residual {
                    let expr_ctx = StorageExprContext {
                        ctx,
                        part: state.part,
                        vid: src,
                        tags: &[],
                        edge: Some(&edge),
                        edge_name: &self.schema_name,
                    };
                    if !eval(residual, &expr_ctx)?.is_true() {
                        return Ok(None);
                    }
                }
                let values = self
                    .return_columns
                    .iter()
                    .map(|name| match name.as_str() {
                        K_SRC => Value::Str(
                            String::from_utf8_lossy(keys::trim_vid(src)).into_owned(),
                        ),
                        K_DST => Value::Str(
                            String::from_utf8_lossy(keys::trim_vid(dst)).into_owned(),
                        ),
                        K_RANK => Value::Int(*rank),
                        K_TYPE => Value::Int(i64::from(etype)),
                        prop => find_prop(&edge.props, prop).unwrap_or(Value::Empty),
                    })
                    .collect();
                Ok(Some(Row::new(values)))
            }
            // a tag index never yields edge refs and vice versa
            _ => Ok(None),
        }
    }
}
