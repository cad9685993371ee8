//! Neighbor expansion: filters, stats, limits, sampling, edge cases.

mod common;

use common::*;
use quiver_storage::protocol::{ErrorCode, StatType, VertexProp};
use quiver_storage::query::neighbors::get_neighbors;
use quiver_storage::row::RowWriter;
use quiver_storage::keys;
use quiver_storage::value::Value;

fn list(items: &[Value]) -> Value {
    Value::List(items.to_vec())
}

fn edge_row(team: &str, start: i64, end: i64) -> Value {
    list(&[Value::Str(team.into()), Value::Int(start), Value::Int(end)])
}

#[test]
fn neighbors_with_edge_filter() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Tracy McGrady"],
        &[(PLAYER, &["name", "age", "avgScore"])],
        &[(SERVE, &["teamName", "startYear", "endYear"])],
    );
    req.traverse_spec.filter = Some(filter_bytes("serve.teamAvgScore > 20"));

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    let dataset = resp.vertices.expect("dataset");
    assert_eq!(
        dataset.column_names,
        vec![
            "_vid",
            "_stats",
            "_tag:1:name:age:avgScore",
            "_edge:+101:teamName:startYear:endYear",
            "_expr"
        ]
    );
    assert_eq!(dataset.rows.len(), 1);
    let row = row_for(&dataset, "Tracy McGrady");
    assert_eq!(row.values[1], Value::Empty, "no stats requested");
    assert_eq!(
        row.values[2],
        list(&[Value::Str("Tracy McGrady".into()), Value::Int(41), Value::Float(19.6)])
    );
    assert_eq!(
        row.values[3],
        list(&[edge_row("Magic", 2000, 2004), edge_row("Rockets", 2004, 2010)])
    );
    assert_eq!(row.values[4], Value::Empty);
}

#[test]
fn neighbors_with_tag_and_edge_filter() {
    let fixture = mock_graph();
    let sources = ["Tracy McGrady", "Tim Duncan", "Tony Parker", "Manu Ginobili"];
    let mut req = neighbors_request(
        &sources,
        &[(PLAYER, &["name", "age", "avgScore"])],
        &[(SERVE, &["teamName", "startYear", "endYear"])],
    );
    req.traverse_spec.filter =
        Some(filter_bytes("serve.teamAvgScore > 18 AND player.avgScore > 18"));

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    let dataset = resp.vertices.expect("dataset");
    assert_eq!(dataset.rows.len(), 4);

    // Parker and Ginobili fail the tag conjunct: tags stay, edges empty.
    for name in ["Tony Parker", "Manu Ginobili"] {
        let row = row_for(&dataset, name);
        assert_ne!(row.values[2], Value::Empty, "tag columns populated for {name}");
        assert_eq!(edge_list(row, 3).len(), 0, "no edges for {name}");
    }
    for name in ["Tracy McGrady", "Tim Duncan"] {
        let row = row_for(&dataset, name);
        assert!(!edge_list(row, 3).is_empty(), "edges for {name}");
    }
}

#[test]
fn stat_aggregation() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["LeBron James"],
        &[(PLAYER, &["name"])],
        &[(SERVE, &["teamName"])],
    );
    req.traverse_spec.stat_props = vec![
        stat_prop("sumGames", "serve.teamGames", StatType::Sum),
        stat_prop("avgScore", "serve.teamAvgScore", StatType::Avg),
        stat_prop("maxCareer", "serve.teamCareer", StatType::Max),
        stat_prop("sumRank", "serve._rank", StatType::Sum),
    ];

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "LeBron James");
    assert_eq!(
        row.values[1],
        list(&[
            Value::Int(1258),
            Value::Float((29.7 + 27.1 + 27.5 + 25.7) / 4.0),
            Value::Int(7),
            // ranks are the start years 2003 + 2010 + 2014 + 2018
            Value::Int(8045),
        ])
    );
}

#[test]
fn limit_truncates_in_type_order() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Dwyane Wade"],
        &[(PLAYER, &["name"])],
        &[(SERVE, &["teamName"]), (TEAMMATE, &["player2"])],
    );
    req.traverse_spec.limit = Some(4);
    req.traverse_spec.random = false;

    let resp = get_neighbors(&fixture.engine, &req);
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "Dwyane Wade");
    assert_eq!(edge_list(row, 3).len(), 4, "all serve edges");
    assert_eq!(edge_list(row, 4).len(), 0, "teammate iteration never starts");
}

#[test]
fn sample_keeps_total_at_limit() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Dwyane Wade"],
        &[(PLAYER, &["name"])],
        &[(SERVE, &["teamName"]), (TEAMMATE, &["player2"])],
    );
    req.traverse_spec.limit = Some(4);
    req.traverse_spec.random = true;

    let resp = get_neighbors(&fixture.engine, &req);
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "Dwyane Wade");
    let total = edge_list(row, 3).len() + edge_list(row, 4).len();
    assert_eq!(total, 4, "reservoir emits exactly the limit");
}

#[test]
fn limit_zero_returns_empty_per_partition() {
    let fixture = mock_graph();
    let mut req = neighbors_request(&["Dwyane Wade"], &[(PLAYER, &["name"])], &[(SERVE, &["teamName"])]);
    req.traverse_spec.limit = Some(0);
    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    assert_eq!(resp.vertices.expect("dataset").rows.len(), 0);
}

#[test]
fn missing_vertex_still_produces_a_row() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Nobody At All"],
        &[(PLAYER, &["name", "age"])],
        &[(SERVE, &["teamName"])],
    );
    req.traverse_spec.stat_props =
        vec![stat_prop("sumGames", "serve.teamGames", StatType::Sum)];

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "Nobody At All");
    assert_eq!(row.values[1], list(&[Value::Int(0)]), "stats zero-initialised");
    assert_eq!(row.values[2], Value::Empty, "absent tag");
    assert_eq!(edge_list(row, 3).len(), 0);
}

#[test]
fn vertex_without_tags_still_expands_edges() {
    let fixture = mock_graph();
    // a source with edges but no tag rows at all
    let space = fixture.catalog.space(SPACE).expect("space");
    let serve = space.edge(SERVE).expect("serve").schema.latest().clone();
    let blob = RowWriter::new(&serve, 0)
        .set("teamName", "Spurs".into())
        .and_then(|w| w.set("startYear", Value::Int(2019)))
        .and_then(|w| w.set("endYear", Value::Int(2020)))
        .and_then(|w| w.set("teamCareer", Value::Int(1)))
        .and_then(|w| w.set("teamGames", Value::Int(50)))
        .and_then(|w| w.set("teamAvgScore", Value::Float(9.5)))
        .expect("fields")
        .finish()
        .expect("row");
    let part = part_of("Ghost Player");
    let key = keys::edge_key(part, &fixed("Ghost Player"), SERVE, 2019, &fixed("Spurs"));
    fixture.store.put(SPACE, part, key, blob);

    let req = neighbors_request(
        &["Ghost Player"],
        &[(PLAYER, &["name"])],
        &[(SERVE, &["teamName"])],
    );
    let resp = get_neighbors(&fixture.engine, &req);
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "Ghost Player");
    assert_eq!(row.values[2], Value::Empty, "no tag rows");
    assert_eq!(edge_list(row, 3), &[list(&[Value::Str("Spurs".into())])]);
}

#[test]
fn reverse_direction_shares_forward_filter_names() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Spurs"],
        &[(TEAM, &["name"])],
        &[(-SERVE, &["teamName", "startYear"])],
    );
    req.traverse_spec.filter = Some(filter_bytes("serve.teamAvgScore >= 10"));

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.result.failed_parts.is_empty());
    let dataset = resp.vertices.expect("dataset");
    assert_eq!(dataset.column_names[3], "_edge:-101:teamName:startYear");
    let row = row_for(&dataset, "Spurs");
    // Duncan 1997, Parker 2001, Ginobili 2002, McGrady 2013 in rank order
    let listed = edge_list(row, 3);
    assert_eq!(listed.len(), 4);
    assert_eq!(
        listed[0],
        list(&[Value::Str("Spurs".into()), Value::Int(1997)])
    );
    assert_eq!(
        listed[3],
        list(&[Value::Str("Spurs".into()), Value::Int(2013)])
    );
}

#[test]
fn unknown_tag_fails_whole_request() {
    let fixture = mock_graph();
    let req = neighbors_request(&["Tim Duncan"], &[(99, &["name"])], &[(SERVE, &["teamName"])]);
    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.vertices.is_none());
    assert_eq!(resp.result.failed_parts.len(), 1);
    assert!(resp
        .result
        .failed_parts
        .iter()
        .all(|p| p.code == ErrorCode::TagNotFound));
}

#[test]
fn unknown_property_fails_whole_request() {
    let fixture = mock_graph();
    let req = neighbors_request(
        &["Tim Duncan"],
        &[(PLAYER, &["name", "nope"])],
        &[(SERVE, &["teamName"])],
    );
    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp
        .result
        .failed_parts
        .iter()
        .all(|p| p.code == ErrorCode::TagPropNotFound));

    let req = neighbors_request(&["Tim Duncan"], &[(PLAYER, &["name"])], &[(SERVE, &["nope"])]);
    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp
        .result
        .failed_parts
        .iter()
        .all(|p| p.code == ErrorCode::EdgePropNotFound));
}

#[test]
fn integer_overflow_in_filter_is_request_fatal() {
    let fixture = mock_graph();
    let mut req = neighbors_request(
        &["Tim Duncan"],
        &[(PLAYER, &["name", "age"])],
        &[(SERVE, &["teamName"])],
    );
    req.traverse_spec.filter =
        Some(filter_bytes("player.age + 1 < -9223372036854775808 - 1"));

    let resp = get_neighbors(&fixture.engine, &req);
    assert!(resp.vertices.is_none());
    assert!(resp
        .result
        .failed_parts
        .iter()
        .all(|p| p.code == ErrorCode::SemanticError));
    let msg = resp.result.error_msg.expect("error message");
    assert!(
        msg.contains("result of (-9223372036854775808-1) cannot be represented as an integer"),
        "got: {msg}"
    );
}

#[test]
fn max_edge_returned_per_vertex_caps_requests() {
    let mut config = quiver_storage::Config::default();
    config.query.max_edge_returned_per_vertex = 2;
    let fixture = mock_graph_with(config);
    let req = neighbors_request(
        &["Dwyane Wade"],
        &[(PLAYER, &["name"])],
        &[(SERVE, &["teamName"]), (TEAMMATE, &["player2"])],
    );
    let resp = get_neighbors(&fixture.engine, &req);
    let dataset = resp.vertices.expect("dataset");
    let row = row_for(&dataset, "Dwyane Wade");
    assert_eq!(edge_list(row, 3).len() + edge_list(row, 4).len(), 2);
}

#[test]
fn concurrent_dispatch_matches_inline_results() {
    let fixture = mock_graph();
    let sources = ["Tracy McGrady", "Tim Duncan", "Tony Parker", "LeBron James"];
    let mut req = neighbors_request(
        &sources,
        &[(PLAYER, &["name", "avgScore"])],
        &[(SERVE, &["teamName", "startYear"])],
    );
    req.traverse_spec.filter = Some(filter_bytes("serve.teamAvgScore > 18"));

    let inline = get_neighbors(&fixture.engine, &req);
    req.common.concurrently = true;
    let pooled = get_neighbors(&fixture.engine, &req);

    assert_eq!(inline.result.failed_parts.len(), pooled.result.failed_parts.len());
    assert_eq!(inline.vertices, pooled.vertices, "merge order is partition order");
}

#[test]
fn bare_tag_presence_and_all_props() {
    let fixture = mock_graph();
    let mut req = neighbors_request(&["Tim Duncan"], &[], &[(SERVE, &["teamName"])]);
    // props = None asks for bare presence; empty list means every prop
    req.traverse_spec.vertex_props = vec![
        VertexProp { tag: PLAYER, props: None },
        VertexProp { tag: TEAM, props: None },
    ];
    let resp = get_neighbors(&fixture.engine, &req);
    let dataset = resp.vertices.expect("dataset");
    assert_eq!(dataset.column_names[2], "_tag:1");
    assert_eq!(dataset.column_names[3], "_tag:2");
    let row = row_for(&dataset, "Tim Duncan");
    assert_eq!(row.values[2], list(&[]), "player tag present");
    assert_eq!(row.values[3], Value::Empty, "team tag absent");
}
