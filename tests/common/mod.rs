//! Shared mock graph for integration tests: an NBA-flavoured space with
//! `player`/`team` tags and `serve`/`teammate` edges, plus request
//! builders mirroring the shapes the graph layer sends.

#![allow(dead_code)]

use quiver_storage::catalog::MetaCatalog;
use quiver_storage::config::Config;
use quiver_storage::expr::{encode_expression, parse_expression};
use quiver_storage::index::{IndexFieldDef, IndexItem};
use quiver_storage::keys;
use quiver_storage::protocol::{
    EdgeProp, NeighborsRequest, RequestCommon, SchemaRef, StatProp, StatType, TraverseSpec,
    VertexProp,
};
use quiver_storage::row::RowWriter;
use quiver_storage::schema::{FieldDef, Schema, SchemaVersions};
use quiver_storage::value::{DataSet, DataType, Row, Value};
use quiver_storage::{
    EdgeType, MemoryStore, PartitionId, QueryEngine, SpaceId, TagId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SPACE: SpaceId = 1;
pub const PARTS: PartitionId = 6;
pub const VID_LEN: usize = 32;
pub const PLAYER: TagId = 1;
pub const TEAM: TagId = 2;
pub const SERVE: EdgeType = 101;
pub const TEAMMATE: EdgeType = 102;
pub const PLAYER_NAME_INDEX: u32 = 11;

const FIXTURE_TS: i64 = 1000;

pub struct Fixture {
    pub catalog: Arc<MetaCatalog>,
    pub store: Arc<MemoryStore>,
    pub engine: QueryEngine,
}

/// Deterministic partition routing: same rule the fixture and the tests
/// use, partitions numbered from 1.
pub fn part_of(vid: &str) -> PartitionId {
    let sum: u32 = vid.bytes().map(u32::from).sum();
    sum % PARTS + 1
}

pub fn fixed(vid: &str) -> Vec<u8> {
    keys::fixed_vid(vid.as_bytes(), VID_LEN).expect("vid fits")
}

fn player_schema() -> SchemaVersions {
    SchemaVersions::new(
        Schema::new(
            0,
            vec![
                FieldDef::new("name", DataType::String),
                FieldDef::new("age", DataType::Int),
                FieldDef::new("avgScore", DataType::Float),
            ],
            None,
        )
        .expect("player schema"),
    )
}

fn team_schema() -> SchemaVersions {
    SchemaVersions::new(
        Schema::new(0, vec![FieldDef::new("name", DataType::String)], None).expect("team schema"),
    )
}

fn serve_schema() -> SchemaVersions {
    SchemaVersions::new(
        Schema::new(
            0,
            vec![
                FieldDef::new("teamName", DataType::String),
                FieldDef::new("startYear", DataType::Int),
                FieldDef::new("endYear", DataType::Int),
                FieldDef::new("teamCareer", DataType::Int),
                FieldDef::new("teamGames", DataType::Int),
                FieldDef::new("teamAvgScore", DataType::Float),
            ],
            None,
        )
        .expect("serve schema"),
    )
}

fn teammate_schema() -> SchemaVersions {
    SchemaVersions::new(
        Schema::new(
            0,
            vec![
                FieldDef::new("player1", DataType::String),
                FieldDef::new("player2", DataType::String),
                FieldDef::new("startYear", DataType::Int),
                FieldDef::new("endYear", DataType::Int),
            ],
            None,
        )
        .expect("teammate schema"),
    )
}

pub struct Player {
    pub name: &'static str,
    pub age: i64,
    pub avg_score: f64,
}

pub const PLAYERS: &[Player] = &[
    Player { name: "Tracy McGrady", age: 41, avg_score: 19.6 },
    Player { name: "Tim Duncan", age: 44, avg_score: 19.0 },
    Player { name: "Tony Parker", age: 38, avg_score: 15.5 },
    Player { name: "Manu Ginobili", age: 42, avg_score: 13.3 },
    Player { name: "LeBron James", age: 36, avg_score: 27.1 },
    Player { name: "Dwyane Wade", age: 39, avg_score: 22.0 },
    Player { name: "Chris Bosh", age: 37, avg_score: 19.2 },
];

/// `(player, team, start, end, career, games, avg)`; rank = start year.
pub const SERVES: &[(&str, &str, i64, i64, i64, i64, f64)] = &[
    ("Tracy McGrady", "Raptors", 1997, 2000, 3, 217, 19.0),
    ("Tracy McGrady", "Magic", 2000, 2004, 4, 295, 25.1),
    ("Tracy McGrady", "Rockets", 2004, 2010, 6, 303, 21.1),
    ("Tracy McGrady", "Spurs", 2013, 2013, 1, 6, 10.5),
    ("Tim Duncan", "Spurs", 1997, 2016, 19, 1392, 19.0),
    ("Tony Parker", "Spurs", 2001, 2018, 18, 1254, 16.6),
    ("Tony Parker", "Hornets", 2018, 2019, 1, 56, 5.4),
    ("Manu Ginobili", "Spurs", 2002, 2018, 16, 1057, 13.3),
    ("LeBron James", "Cavaliers", 2003, 2010, 7, 548, 29.7),
    ("LeBron James", "Heat", 2010, 2014, 4, 294, 27.1),
    ("LeBron James", "Cavaliers", 2014, 2018, 4, 301, 27.5),
    ("LeBron James", "Lakers", 2018, 2020, 2, 115, 25.7),
    ("Dwyane Wade", "Heat", 2003, 2016, 13, 855, 25.1),
    ("Dwyane Wade", "Bulls", 2016, 2017, 1, 60, 23.5),
    ("Dwyane Wade", "Cavaliers", 2017, 2018, 1, 46, 11.2),
    ("Dwyane Wade", "Heat", 2018, 2019, 1, 72, 15.0),
];

/// `(player1, player2, start, end)`; stored in both directions.
pub const TEAMMATES: &[(&str, &str, i64, i64)] = &[
    ("Dwyane Wade", "LeBron James", 2010, 2014),
    ("Dwyane Wade", "Chris Bosh", 2010, 2016),
];

const TEAMS: &[&str] = &[
    "Raptors", "Magic", "Rockets", "Spurs", "Hornets", "Cavaliers", "Heat", "Lakers", "Bulls",
];

pub fn mock_graph() -> Fixture {
    mock_graph_with(Config::default())
}

pub fn mock_graph_with(config: Config) -> Fixture {
    let catalog = Arc::new(MetaCatalog::new());
    catalog.create_space(SPACE, "nba", VID_LEN, PARTS).expect("space");
    catalog.add_tag(SPACE, PLAYER, "player", player_schema()).expect("player");
    catalog.add_tag(SPACE, TEAM, "team", team_schema()).expect("team");
    catalog.add_edge(SPACE, SERVE, "serve", serve_schema()).expect("serve");
    catalog.add_edge(SPACE, TEAMMATE, "teammate", teammate_schema()).expect("teammate");
    catalog
        .add_index(
            SPACE,
            IndexItem {
                index_id: PLAYER_NAME_INDEX,
                name: "player_name_index".into(),
                schema: SchemaRef::Tag(PLAYER),
                fields: vec![IndexFieldDef::new("name", DataType::String)],
            },
        )
        .expect("index");

    let store = Arc::new(MemoryStore::new());
    let space = catalog.space(SPACE).expect("space");

    for player in PLAYERS {
        let part = part_of(player.name);
        let blob = RowWriter::new(space.tag(PLAYER).expect("player").schema.latest(), FIXTURE_TS)
            .set("name", player.name.into())
            .and_then(|w| w.set("age", Value::Int(player.age)))
            .and_then(|w| w.set("avgScore", Value::Float(player.avg_score)))
            .expect("player fields")
            .finish()
            .expect("player row");
        let key = keys::vertex_key(part, &fixed(player.name), PLAYER);
        store.put(SPACE, part, key, blob.clone());

        // index entry: name -> vid
        let item = space.index(PLAYER_NAME_INDEX).expect("index");
        let columns = quiver_storage::index::encode_row_columns(item, &|prop| {
            if prop == "name" {
                Value::Str(player.name.to_string())
            } else {
                Value::Null
            }
        })
        .expect("index columns");
        let ikey = keys::index_key(part, PLAYER_NAME_INDEX, &columns, &fixed(player.name));
        store.put(SPACE, part, ikey, Vec::new());
    }

    for team in TEAMS {
        let part = part_of(team);
        let blob = RowWriter::new(space.tag(TEAM).expect("team").schema.latest(), FIXTURE_TS)
            .set("name", (*team).into())
            .expect("team fields")
            .finish()
            .expect("team row");
        store.put(SPACE, part, keys::vertex_key(part, &fixed(team), TEAM), blob);
    }

    let serve_latest = space.edge(SERVE).expect("serve").schema.latest().clone();
    for (player, team, start, end, career, games, avg) in SERVES {
        let blob = RowWriter::new(&serve_latest, FIXTURE_TS)
            .set("teamName", (*team).into())
            .and_then(|w| w.set("startYear", Value::Int(*start)))
            .and_then(|w| w.set("endYear", Value::Int(*end)))
            .and_then(|w| w.set("teamCareer", Value::Int(*career)))
            .and_then(|w| w.set("teamGames", Value::Int(*games)))
            .and_then(|w| w.set("teamAvgScore", Value::Float(*avg)))
            .expect("serve fields")
            .finish()
            .expect("serve row");
        // forward edge grouped under the player, reverse under the team
        let part = part_of(player);
        let key = keys::edge_key(part, &fixed(player), SERVE, *start, &fixed(team));
        store.put(SPACE, part, key, blob.clone());
        let rpart = part_of(team);
        let rkey = keys::edge_key(rpart, &fixed(team), -SERVE, *start, &fixed(player));
        store.put(SPACE, rpart, rkey, blob);
    }

    let teammate_latest = space.edge(TEAMMATE).expect("teammate").schema.latest().clone();
    for (p1, p2, start, end) in TEAMMATES {
        let blob = RowWriter::new(&teammate_latest, FIXTURE_TS)
            .set("player1", (*p1).into())
            .and_then(|w| w.set("player2", (*p2).into()))
            .and_then(|w| w.set("startYear", Value::Int(*start)))
            .and_then(|w| w.set("endYear", Value::Int(*end)))
            .expect("teammate fields")
            .finish()
            .expect("teammate row");
        for (src, dst) in [(p1, p2), (p2, p1)] {
            let part = part_of(src);
            let key = keys::edge_key(part, &fixed(src), TEAMMATE, *start, &fixed(dst));
            store.put(SPACE, part, key, blob.clone());
        }
    }

    let engine = QueryEngine::new(
        Arc::clone(&catalog),
        Arc::<MemoryStore>::clone(&store),
        &config,
    );
    Fixture { catalog, store, engine }
}

/// Encode a textual filter the way the graph layer ships it.
pub fn filter_bytes(text: &str) -> Vec<u8> {
    encode_expression(&parse_expression(text).expect("filter parses"))
}

pub fn stat_prop(alias: &str, expr: &str, stat: StatType) -> StatProp {
    StatProp { alias: alias.to_string(), expression: filter_bytes(expr), stat }
}

/// Build a neighbor request over the given sources, mirroring the graph
/// layer's shape: vids grouped by partition, props in request order.
pub fn neighbors_request(
    vids: &[&str],
    tags: &[(TagId, &[&str])],
    edges: &[(EdgeType, &[&str])],
) -> NeighborsRequest {
    let mut parts: BTreeMap<PartitionId, Vec<Vec<u8>>> = BTreeMap::new();
    for vid in vids {
        parts.entry(part_of(vid)).or_default().push(vid.as_bytes().to_vec());
    }
    NeighborsRequest {
        space_id: SPACE,
        parts,
        traverse_spec: TraverseSpec {
            edge_types: edges.iter().map(|(etype, _)| *etype).collect(),
            vertex_props: tags
                .iter()
                .map(|(tag, props)| VertexProp {
                    tag: *tag,
                    props: Some(props.iter().map(|p| (*p).to_string()).collect()),
                })
                .collect(),
            edge_props: edges
                .iter()
                .map(|(etype, props)| EdgeProp {
                    edge: *etype,
                    props: Some(props.iter().map(|p| (*p).to_string()).collect()),
                })
                .collect(),
            ..Default::default()
        },
        common: RequestCommon::default(),
    }
}

/// The row whose `_vid` column matches.
pub fn row_for<'a>(dataset: &'a DataSet, vid: &str) -> &'a Row {
    dataset
        .rows
        .iter()
        .find(|row| row.values.first() == Some(&Value::Str(vid.to_string())))
        .unwrap_or_else(|| panic!("no row for vid {vid}"))
}

pub fn edge_list(row: &Row, col: usize) -> &[Value] {
    match &row.values[col] {
        Value::List(items) => items,
        other => panic!("expected edge list, got {other:?}"),
    }
}
