//! Vertex and edge scans: per-partition limits, cursor resumption, time
//! bounds, TTL.

mod common;

use anyhow::Context;
use common::*;
use quiver_storage::keys;
use quiver_storage::protocol::{
    EdgeProp, ErrorCode, RequestCommon, ScanCursor, ScanEdgeRequest, ScanVertexRequest, VertexProp,
};
use quiver_storage::query::scan::{scan_edges, scan_vertices};
use quiver_storage::row::RowWriter;
use quiver_storage::schema::{FieldDef, Schema, SchemaVersions};
use quiver_storage::value::{DataType, Row, Value};
use quiver_storage::PartitionId;
use std::collections::BTreeMap;

fn vertex_request(parts: &[PartitionId], limit: i64) -> ScanVertexRequest {
    ScanVertexRequest {
        space_id: SPACE,
        parts: parts.iter().map(|p| (*p, ScanCursor::default())).collect(),
        return_columns: vec![VertexProp { tag: PLAYER, props: Some(vec![]) }],
        limit,
        start_time: None,
        end_time: None,
        only_latest_version: false,
        common: RequestCommon::default(),
    }
}

fn players_in_part(part: PartitionId) -> usize {
    PLAYERS.iter().filter(|p| part_of(p.name) == part).count()
}

#[test]
fn full_vertex_scan_sees_every_player() {
    let fixture = mock_graph();
    let parts: Vec<PartitionId> = (1..=PARTS).collect();
    let resp = scan_vertices(&fixture.engine, &vertex_request(&parts, 100));
    assert!(resp.result.failed_parts.is_empty());
    assert_eq!(resp.props.rows.len(), PLAYERS.len());
    assert_eq!(resp.props.column_names[0], "_vid");
    assert!(resp.props.column_names.contains(&"player.avgScore".to_string()));
    for cursor in resp.cursors.values() {
        assert!(!cursor.has_next);
        assert!(cursor.next_cursor.is_none());
    }
}

#[test]
fn per_partition_limit_holds() {
    let fixture = mock_graph();
    let parts: Vec<PartitionId> = (1..=PARTS).collect();
    let limit = 1;
    let resp = scan_vertices(&fixture.engine, &vertex_request(&parts, limit));
    assert!(resp.result.failed_parts.is_empty());
    let expected: usize = parts
        .iter()
        .map(|p| players_in_part(*p).min(limit as usize))
        .sum();
    assert!(resp.props.rows.len() as i64 <= limit * parts.len() as i64);
    assert_eq!(resp.props.rows.len(), expected);
}

#[test]
fn cursor_resumption_is_idempotent() {
    let fixture = mock_graph();
    for part in 1..=PARTS {
        let full = scan_vertices(&fixture.engine, &vertex_request(&[part], 100));
        let full_rows = full.props.rows;

        // page through the partition one row at a time
        let mut paged: Vec<Row> = Vec::new();
        let mut cursor = ScanCursor::default();
        loop {
            let mut req = vertex_request(&[part], 1);
            req.parts = BTreeMap::from([(part, cursor.clone())]);
            let resp = scan_vertices(&fixture.engine, &req);
            assert!(resp.result.failed_parts.is_empty());
            paged.extend(resp.props.rows);
            let next = resp.cursors.get(&part).cloned().unwrap_or_default();
            if !next.has_next {
                break;
            }
            cursor = next;
        }
        assert_eq!(paged, full_rows, "partition {part} pages equal one scan");
    }
}

#[test]
fn corrupt_cursor_fails_only_its_partition() {
    let fixture = mock_graph();
    let mut req = vertex_request(&[1, 2], 10);
    req.parts.insert(
        1,
        ScanCursor { has_next: true, next_cursor: Some(vec![0xde, 0xad, 0xbe, 0xef, 0x99]) },
    );
    let resp = scan_vertices(&fixture.engine, &req);
    assert_eq!(resp.result.failed_parts.len(), 1);
    assert_eq!(resp.result.failed_parts[0].part_id, 1);
    assert_eq!(resp.result.failed_parts[0].code, ErrorCode::InvalidCursor);
    // partition 2 still answered
    assert!(resp.cursors.contains_key(&2));
}

#[test]
fn catalog_change_invalidates_cursors() {
    let fixture = mock_graph();
    let part = part_of("Tim Duncan");
    let first = scan_vertices(&fixture.engine, &vertex_request(&[part], 1));
    let cursor = first.cursors.get(&part).cloned().unwrap_or_default();
    if !cursor.has_next {
        // partition held a single player; nothing to resume
        return;
    }

    // any metadata change bumps the catalog version
    fixture.catalog.create_space(99, "other", 8, 1).expect("space");

    let mut req = vertex_request(&[part], 1);
    req.parts = BTreeMap::from([(part, cursor)]);
    let resp = scan_vertices(&fixture.engine, &req);
    assert_eq!(resp.result.failed_parts.len(), 1);
    assert_eq!(resp.result.failed_parts[0].code, ErrorCode::InvalidCursor);
}

#[test]
fn time_bounds_hide_rows_outside_the_window() {
    let fixture = mock_graph();
    let parts: Vec<PartitionId> = (1..=PARTS).collect();

    let mut req = vertex_request(&parts, 100);
    req.start_time = Some(0);
    req.end_time = Some(1001);
    let resp = scan_vertices(&fixture.engine, &req);
    assert_eq!(resp.props.rows.len(), PLAYERS.len(), "fixture rows are at ts 1000");

    let mut req = vertex_request(&parts, 100);
    req.start_time = Some(1001);
    let resp = scan_vertices(&fixture.engine, &req);
    assert_eq!(resp.props.rows.len(), 0, "everything written before the window");
}

#[test]
fn edge_scan_emits_one_row_per_edge() {
    let fixture = mock_graph();
    let parts: Vec<PartitionId> = (1..=PARTS).collect();
    let req = ScanEdgeRequest {
        space_id: SPACE,
        parts: parts.iter().map(|p| (*p, ScanCursor::default())).collect(),
        return_columns: vec![EdgeProp {
            edge: SERVE,
            props: Some(vec!["_src".into(), "_dst".into(), "_rank".into(), "teamName".into()]),
        }],
        limit: 1000,
        start_time: None,
        end_time: None,
        only_latest_version: false,
        common: RequestCommon::default(),
    };
    let resp = scan_edges(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    // forward serve edges only; the reverse mirror has its own type id
    assert_eq!(resp.props.rows.len(), SERVES.len());
    assert_eq!(
        resp.props.column_names,
        vec!["serve._src", "serve._dst", "serve._rank", "serve.teamName"]
    );
    let duncan = resp
        .props
        .rows
        .iter()
        .find(|r| r.values[0] == Value::Str("Tim Duncan".into()))
        .expect("duncan edge");
    assert_eq!(duncan.values[1], Value::Str("Spurs".into()));
    assert_eq!(duncan.values[2], Value::Int(1997));
}

#[test]
fn edge_scan_pages_like_one_scan() {
    let fixture = mock_graph();
    let part = part_of("LeBron James");
    let base = ScanEdgeRequest {
        space_id: SPACE,
        parts: BTreeMap::from([(part, ScanCursor::default())]),
        return_columns: vec![EdgeProp { edge: SERVE, props: Some(vec![]) }],
        limit: 100,
        start_time: None,
        end_time: None,
        only_latest_version: false,
        common: RequestCommon::default(),
    };
    let full = scan_edges(&fixture.engine, &base);

    let mut paged: Vec<Row> = Vec::new();
    let mut cursor = ScanCursor::default();
    loop {
        let mut req = base.clone();
        req.limit = 2;
        req.parts = BTreeMap::from([(part, cursor.clone())]);
        let resp = scan_edges(&fixture.engine, &req);
        paged.extend(resp.props.rows);
        let next = resp.cursors.get(&part).cloned().unwrap_or_default();
        if !next.has_next {
            break;
        }
        cursor = next;
    }
    assert_eq!(paged, full.props.rows);
}

#[test]
fn mock_ttl_hides_expired_rows() -> anyhow::Result<()> {
    let mut config = quiver_storage::Config::default();
    config.query.mock_ttl_col = "lastAccess".to_string();
    config.query.mock_ttl_duration = 100;
    let fixture = mock_graph_with(config);

    // a side space whose tag carries the mocked TTL column
    const SESSIONS: quiver_storage::SpaceId = 2;
    let schema = SchemaVersions::new(Schema::new(
        0,
        vec![
            FieldDef::new("user", DataType::String),
            FieldDef::new("lastAccess", DataType::Timestamp),
        ],
        None,
    )?);
    fixture.catalog.create_space(SESSIONS, "sessions", 16, 1)?;
    fixture.catalog.add_tag(SESSIONS, 5, "session", schema)?;
    let space = fixture.catalog.space(SESSIONS).context("sessions space registered")?;
    let latest = space.tag(5).context("session tag registered")?.schema.latest().clone();

    let now = chrono::Utc::now().timestamp();
    for (vid, last_access) in [("fresh", now - 10), ("stale", now - 500)] {
        let blob = RowWriter::new(&latest, now)
            .set("user", vid.into())?
            .set("lastAccess", Value::Timestamp(last_access))?
            .finish()?;
        let fixed = keys::fixed_vid(vid.as_bytes(), 16).context("vid fits")?;
        fixture.store.put(SESSIONS, 1, keys::vertex_key(1, &fixed, 5), blob);
    }

    let req = ScanVertexRequest {
        space_id: SESSIONS,
        parts: BTreeMap::from([(1, ScanCursor::default())]),
        return_columns: vec![VertexProp { tag: 5, props: Some(vec!["user".into()]) }],
        limit: 10,
        start_time: None,
        end_time: None,
        only_latest_version: false,
        common: RequestCommon::default(),
    };
    let resp = scan_vertices(&fixture.engine, &req);
    assert_eq!(resp.props.rows.len(), 1);
    assert_eq!(resp.props.rows[0].values[0], Value::Str("fresh".into()));
    Ok(())
}

#[test]
fn moved_leader_is_partition_local() {
    let fixture = mock_graph();
    let parts: Vec<PartitionId> = (1..=PARTS).collect();
    fixture.store.set_leader_moved(SPACE, 3, true);
    let resp = scan_vertices(&fixture.engine, &vertex_request(&parts, 100));
    assert_eq!(resp.result.failed_parts.len(), 1);
    assert_eq!(resp.result.failed_parts[0].part_id, 3);
    assert_eq!(resp.result.failed_parts[0].code, ErrorCode::LeaderChanged);
    let healthy: usize = parts
        .iter()
        .filter(|p| **p != 3)
        .map(|p| players_in_part(*p))
        .sum();
    assert_eq!(resp.props.rows.len(), healthy);
}
