use std::fs;
use std::path::Path;

use scenegen::behavior::{builtin_catalog, builtin_commands, BehaviorRegistry};
use scenegen::context::BuildContext;
use scenegen::output::load_registries;
use scenegen::placement::{align_to_ground, ALIGN_TOLERANCE};
use scenegen::spec::{SceneEntry, MAX_INPUT_CHARS};
use scenegen::ui::PreparedActions;
use scenegen::{
    compile_game, compile_scene, parse_game_spec, CompileError, CompileOptions, CompileReport,
    DiagnosticCode, FsAssetStore, ProjectPaths, SpecParseError,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_png(root: &Path, relative: &str, width: u32, height: u32) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("asset dir");
    image::RgbaImage::new(width, height).save(&path).expect("write png");
}

fn write_fixtures(root: &Path) {
    write_png(root, "Assets/Sprites/player.png", 100, 100);
    write_png(root, "Assets/Sprites/ground.png", 1000, 100);
    write_png(root, "Assets/Tiles/terrain.png", 32, 16);
}

fn compile(root: &Path, spec: &Value) -> CompileReport {
    let store = FsAssetStore::new(root, None);
    compile_game(&spec.to_string(), &CompileOptions::new(root), &store).expect("compile")
}

fn read_artifact(report: &CompileReport, index: usize) -> Value {
    let raw = fs::read_to_string(&report.saved[index].path).expect("read artifact");
    serde_json::from_str(&raw).expect("artifact json")
}

fn entity<'a>(artifact: &'a Value, name: &str) -> &'a Value {
    artifact["graph"]["entities"]
        .as_array()
        .expect("entities")
        .iter()
        .find(|entity| entity["name"] == name)
        .unwrap_or_else(|| panic!("no entity named {name}"))
}

fn tile_spec(rows: Value, legend: Value) -> Value {
    json!({"game": {
        "tilesets": [{
            "name": "terrain",
            "image": "Tiles/terrain.png",
            "tileSize": 16,
            "tiles": [{"name": "x", "x": 0, "y": 0}, {"name": "y", "x": 16, "y": 0}]
        }],
        "scenes": [{
            "name": "Tiles",
            "tilemaps": [{"name": "Ground", "tileset": "terrain",
                "grid": {"rows": rows, "legend": legend}}]
        }]
    }})
}

fn painted_tiles(artifact: &Value) -> Vec<(i64, i64, String)> {
    entity(artifact, "Ground")["components"]["tile_layer"]["tiles"]
        .as_array()
        .expect("tiles")
        .iter()
        .map(|tile| {
            (
                tile["x"].as_i64().expect("x"),
                tile["y"].as_i64().expect("y"),
                tile["tile"].as_str().expect("tile").to_string(),
            )
        })
        .collect()
}

#[test]
fn minimal_spec_yields_one_orthographic_scene() {
    let temp = TempDir::new().expect("tempdir");
    let report = compile(temp.path(), &json!({"game": {"scenes": [{"name": "S"}]}}));

    assert_eq!(report.saved.len(), 1);
    assert_eq!(report.saved[0].name, "S");
    assert!(report.aborted.is_empty());
    assert!(temp.path().join("Assets/Scenes/S.scene.json").is_file());

    let artifact = read_artifact(&report, 0);
    assert_eq!(artifact["name"], "S");
    let camera = &entity(&artifact, "Main Camera")["components"]["camera"];
    assert_eq!(camera["orthographic"], true);
    assert_eq!(camera["size"], 5.0);

    let build_list: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("ProjectSettings/EditorBuildSettings.json"))
            .expect("build list"),
    )
    .expect("build list json");
    assert_eq!(build_list["scenes"][0]["path"], "Assets/Scenes/S.scene.json");
}

#[test]
fn repeated_runs_write_identical_artifacts() {
    let spec = json!({"game": {
        "settings": {"sortingLayers": ["Background", "Foreground"]},
        "scenes": [{
            "name": "Level 1",
            "backgroundColor": "#203040",
            "gameObjects": [
                {"name": "Floor", "tag": "Ground",
                 "sprite": {"path": "Sprites/ground.png", "sortingLayer": "Background"},
                 "physics": {"colliders": [{"type": "box"}]}},
                {"name": "Player", "tag": "Player", "transform": {"position": {"x": 0, "y": 4}},
                 "sprite": {"path": "Sprites/player.png", "sortingLayer": "Foreground"},
                 "physics": {"rigidbody": {"bodyType": "dynamic"}, "colliders": [{"type": "box"}]},
                 "scripts": [{"name": "PlayerController", "parameters": {"moveSpeed": 6}}]}
            ],
            "ui": [{"name": "Score", "type": "text", "text": "0"}]
        }]
    }});

    let first = TempDir::new().expect("first");
    let second = TempDir::new().expect("second");
    write_fixtures(first.path());
    write_fixtures(second.path());
    let a = compile(first.path(), &spec);
    let b = compile(second.path(), &spec);

    let bytes_a = fs::read(&a.saved[0].path).expect("read a");
    let bytes_b = fs::read(&b.saved[0].path).expect("read b");
    assert_eq!(bytes_a, bytes_b);
    assert_eq!(a.diagnostics, b.diagnostics);

    let registries = load_registries(&ProjectPaths::from_root(first.path()).expect("paths"))
        .expect("registries");
    let names = registries
        .sorting_layers
        .layers()
        .iter()
        .map(|layer| layer.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Default", "Background", "Foreground"]);

    compile(first.path(), &spec);
    let reloaded = load_registries(&ProjectPaths::from_root(first.path()).expect("paths"))
        .expect("registries after second run");
    assert_eq!(reloaded.sorting_layers.layers(), registries.sorting_layers.layers());
    assert!(reloaded
        .sorting_layers
        .layers()
        .iter()
        .skip(1)
        .all(|layer| layer.unique_id != 0));
}

#[test]
fn player_lands_on_a_dynamic_crate_that_lands_on_the_floor() {
    let temp = TempDir::new().expect("tempdir");
    write_fixtures(temp.path());
    let spec = json!({"game": {"scenes": [{
        "name": "Stack",
        "gameObjects": [
            {"name": "Floor", "tag": "Ground", "sprite": {"path": "Sprites/ground.png"},
             "physics": {"colliders": [{"type": "box"}]}},
            {"name": "Crate", "tag": "Ground", "transform": {"position": {"x": 0, "y": 10}},
             "sprite": {"path": "Sprites/player.png"},
             "physics": {"rigidbody": {"bodyType": "dynamic"}, "colliders": [{"type": "box"}]}},
            {"name": "Player", "transform": {"position": {"x": 0, "y": 20}},
             "sprite": {"path": "Sprites/player.png"},
             "physics": {"rigidbody": {"bodyType": "dynamic"}}}
        ]
    }]}});

    let report = compile(temp.path(), &spec);
    let artifact = read_artifact(&report, 0);
    let height = |name: &str| {
        entity(&artifact, name)["transform"]["position"]["y"]
            .as_f64()
            .expect("y")
    };
    assert!((height("Crate") - 1.0).abs() < f64::from(ALIGN_TOLERANCE));
    assert!((height("Player") - 2.0).abs() < f64::from(ALIGN_TOLERANCE));
}

#[test]
fn grid_rows_are_inverted_into_engine_rows() {
    let temp = TempDir::new().expect("tempdir");
    write_fixtures(temp.path());
    let report = compile(
        temp.path(),
        &tile_spec(json!(["A", "B"]), json!({"A": "x", "B": "y"})),
    );
    let tiles = painted_tiles(&read_artifact(&report, 0));
    assert!(tiles.contains(&(0, 0, "y".to_string())));
    assert!(tiles.contains(&(0, 1, "x".to_string())));
    assert_eq!(tiles.len(), 2);
}

#[test]
fn explicit_no_tile_marker_beats_a_matching_tile_name() {
    let temp = TempDir::new().expect("tempdir");
    write_fixtures(temp.path());
    let report = compile(
        temp.path(),
        &tile_spec(json!(["xy", "yx"]), json!({"x": null})),
    );
    let tiles = painted_tiles(&read_artifact(&report, 0));
    assert_eq!(tiles.len(), 2);
    assert!(tiles.iter().all(|(_, _, name)| name == "y"));
    assert_eq!(report.diagnostics_with_code(DiagnosticCode::UnknownTileName).count(), 0);
}

#[test]
fn composite_tile_collider_merges_into_one_outline() {
    let temp = TempDir::new().expect("tempdir");
    write_fixtures(temp.path());
    let mut spec = tile_spec(json!(["xxx"]), json!({}));
    spec["game"]["scenes"][0]["tilemaps"][0]["collider"] = json!("composite");
    let report = compile(temp.path(), &spec);
    let layer = entity(&read_artifact(&report, 0), "Ground").clone();
    let outlines = layer["components"]["tile_layer"]["collision"]["Composite"]["outlines"]
        .as_array()
        .expect("outlines")
        .clone();
    assert_eq!(outlines.len(), 1);
    assert_eq!(outlines[0].as_array().expect("outline").len(), 4);
    assert_eq!(layer["components"]["body"]["kind"], "Static");
}

#[test]
fn unknown_behavior_is_skipped_with_one_warning() {
    let temp = TempDir::new().expect("tempdir");
    let report = compile(
        temp.path(),
        &json!({"game": {"scenes": [{
            "name": "S",
            "gameObjects": [{"name": "Coin", "scripts": [
                {"name": "NoSuchBehavior", "parameters": {"speed": 3}},
                {"name": "Collectible", "parameters": {"scoreValue": 5}},
                {"name": "Hazard"}
            ]}]
        }]}}),
    );
    assert_eq!(report.warning_count(), 1);
    assert_eq!(report.diagnostics_with_code(DiagnosticCode::UnknownBehavior).count(), 1);

    let artifact = read_artifact(&report, 0);
    let behaviors = entity(&artifact, "Coin")["components"]["behaviors"]
        .as_array()
        .expect("behaviors")
        .iter()
        .map(|behavior| behavior["name"].as_str().expect("name").to_string())
        .collect::<Vec<_>>();
    assert_eq!(behaviors, vec!["Collectible", "Hazard"]);
}

#[test]
fn dynamic_entity_settles_on_ground_and_stays_there() {
    let temp = TempDir::new().expect("tempdir");
    write_fixtures(temp.path());
    let spec = json!({"game": {"scenes": [{
        "name": "Fall",
        "gameObjects": [
            {"name": "Floor", "tag": "Ground", "sprite": {"path": "Sprites/ground.png"},
             "physics": {"colliders": [{"type": "box"}]}},
            {"name": "Player", "transform": {"position": {"x": 0.25, "y": 5}},
             "sprite": {"path": "Sprites/player.png"},
             "physics": {"rigidbody": {"bodyType": "dynamic"}}}
        ]
    }]}})
    .to_string();

    let parsed = parse_game_spec(&spec).expect("parse");
    let SceneEntry::Parsed(scene) = &parsed.spec.scenes[0] else {
        panic!("scene should parse");
    };
    let store = FsAssetStore::new(temp.path(), None);
    let mut ctx = BuildContext::new(
        Default::default(),
        BehaviorRegistry::build(&[builtin_catalog()], &[]),
        builtin_commands(),
        &store,
        parsed.spec.settings.pixels_per_unit(),
    );
    ctx.apply_settings(&parsed.spec.settings);
    let mut artifact = compile_scene(
        &mut ctx,
        scene,
        0,
        &parsed.spec.tilesets,
        &PreparedActions::new(),
        "test",
        "hash",
    );

    let graph = &artifact.graph;
    let player = graph.find_by_name("Player").expect("player");
    let floor = graph.find_by_name("Floor").expect("floor");
    let bottom = graph.world_visual_bounds(player).expect("player bounds").min.y;
    let top = graph.world_collider_bounds(floor).expect("floor bounds").max.y;
    assert!((bottom - top).abs() < ALIGN_TOLERANCE, "bottom {bottom} top {top}");

    let ground_layer = ctx.registries.layers.index_of("Ground");
    assert!(align_to_ground(&mut artifact.graph, ground_layer).is_empty());
    let after = artifact
        .graph
        .world_visual_bounds(player)
        .expect("player bounds")
        .min
        .y;
    assert!((after - bottom).abs() < f32::EPSILON);
}

#[test]
fn oversized_input_is_fatal_and_writes_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let padding = "a".repeat(MAX_INPUT_CHARS);
    let raw = format!(r#"{{"game":{{"scenes":[{{"name":"S"}}],"notes":"{padding}"}}}}"#);
    let store = FsAssetStore::new(temp.path(), None);

    let err = compile_game(&raw, &CompileOptions::new(temp.path()), &store)
        .expect_err("oversized input");
    assert!(matches!(
        err,
        CompileError::Parse(SpecParseError::Oversized { .. })
    ));
    assert!(!temp.path().join("Assets/Scenes").exists());
    assert!(!temp.path().join("ProjectSettings").exists());
}

#[test]
fn menu_button_loads_a_sibling_scene() {
    let temp = TempDir::new().expect("tempdir");
    let report = compile(
        temp.path(),
        &json!({"game": {"scenes": [
            {"name": "Menu", "ui": [
                {"name": "Play", "type": "button", "text": "Play",
                 "onClick": {"command": "LoadScene", "args": {"scene": "Level1"}}},
                {"name": "Broken", "type": "button", "onClick": {"command": "Explode"}}
            ]},
            {"name": "Level1"}
        ]}}),
    );
    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.diagnostics_with_code(DiagnosticCode::UnknownCommand).count(), 1);

    let menu = read_artifact(&report, 0);
    let play = &entity(&menu, "Play")["components"]["ui"];
    assert_eq!(play["on_click"]["command"], "LoadScene");
    assert!(entity(&menu, "Broken")["components"]["ui"]["on_click"].is_null());
    assert_eq!(entity(&menu, "Play")["parent"], entity(&menu, "Canvas")["id"]);
}

#[test]
fn missing_sprite_keeps_the_entity_and_falls_back_to_secondary_root() {
    let temp = TempDir::new().expect("project");
    let fallback = TempDir::new().expect("fallback");
    write_png(fallback.path(), "hero.png", 64, 32);

    let spec = json!({"game": {"scenes": [{"name": "S", "gameObjects": [
        {"name": "Hero", "sprite": {"path": "Sprites/hero.png"}},
        {"name": "Ghost", "sprite": {"path": "Sprites/ghost.png"}}
    ]}]}});
    let store = FsAssetStore::new(temp.path(), Some(fallback.path().to_path_buf()));
    let report = compile_game(&spec.to_string(), &CompileOptions::new(temp.path()), &store)
        .expect("compile");

    assert_eq!(report.diagnostics_with_code(DiagnosticCode::AssetNotFound).count(), 1);
    let artifact = read_artifact(&report, 0);
    assert_eq!(
        entity(&artifact, "Hero")["components"]["visual"]["pixel_size"],
        json!([64, 32])
    );
    assert!(entity(&artifact, "Ghost")["components"]["visual"].is_null());
}
