use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::BuildContext;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::math::{Rect, Vec2, Vec3};
use crate::scene::{EntityId, PhysicsBody, SceneGraph};
use crate::spec::{TileColliderKind, TileGridSpec, TilemapSpec, TilesetSpec};

pub const GRID_ROOT_NAME: &str = "Grid";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilesetError {
    #[error("tileset '{tileset}' has no usable tile size")]
    ZeroTileSize { tileset: String },
    #[error("atlas of tileset '{tileset}' ({width}x{height}) is smaller than one {tile_width}x{tile_height} tile")]
    AtlasTooSmall {
        tileset: String,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    },
}

/// Cell address in the atlas, counted from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AtlasCell {
    pub col: u32,
    pub row: u32,
}

/// An atlas image cut into equal cells, plus every name a cell answers to.
#[derive(Debug, Clone, PartialEq)]
pub struct TileAtlas {
    pub tileset: String,
    pub image: String,
    pub tile_size: (u32, u32),
    pub columns: u32,
    pub rows: u32,
    pub pixels_per_unit: f32,
    names: BTreeMap<String, AtlasCell>,
}

impl TileAtlas {
    pub fn cell(&self, name: &str) -> Option<AtlasCell> {
        self.names.get(name).copied()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// World size of one cell at the atlas's pixels-per-unit.
    pub fn cell_world_size(&self) -> Vec2 {
        Vec2::new(
            self.tile_size.0 as f32 / self.pixels_per_unit,
            self.tile_size.1 as f32 / self.pixels_per_unit,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlicedAtlas {
    pub atlas: TileAtlas,
    /// Declared tiles whose pixel coordinate falls outside the atlas grid.
    pub out_of_range: Vec<String>,
}

/// Cuts the atlas into `width / tileW` by `height / tileH` cells. Every cell is named
/// `<tileset>_<row * columns + col>`; declared tiles add their own names on top.
pub fn slice_atlas(
    tileset: &TilesetSpec,
    image_size: (u32, u32),
    default_pixels_per_unit: f32,
) -> Result<SlicedAtlas, TilesetError> {
    let (tile_width, tile_height) = tileset.tile_pixel_size();
    if tile_width == 0 || tile_height == 0 {
        return Err(TilesetError::ZeroTileSize {
            tileset: tileset.name.clone(),
        });
    }
    let columns = image_size.0 / tile_width;
    let rows = image_size.1 / tile_height;
    if columns == 0 || rows == 0 {
        return Err(TilesetError::AtlasTooSmall {
            tileset: tileset.name.clone(),
            width: image_size.0,
            height: image_size.1,
            tile_width,
            tile_height,
        });
    }

    let mut names = BTreeMap::new();
    for row in 0..rows {
        for col in 0..columns {
            names.insert(
                format!("{}_{}", tileset.name, row * columns + col),
                AtlasCell { col, row },
            );
        }
    }

    let mut out_of_range = Vec::new();
    for tile in &tileset.tiles {
        let cell = AtlasCell {
            col: tile.x / tile_width,
            row: tile.y / tile_height,
        };
        if cell.col >= columns || cell.row >= rows {
            out_of_range.push(tile.name.clone());
            continue;
        }
        names.insert(tile.name.clone(), cell);
    }

    let pixels_per_unit = tileset
        .pixels_per_unit
        .filter(|ppu| ppu.is_finite() && *ppu > 0.0)
        .unwrap_or(default_pixels_per_unit);

    Ok(SlicedAtlas {
        atlas: TileAtlas {
            tileset: tileset.name.clone(),
            image: tileset.image.clone(),
            tile_size: (tile_width, tile_height),
            columns,
            rows,
            pixels_per_unit,
            names,
        },
        out_of_range,
    })
}

/// Engine-native cell index: `y = 0` is the bottom row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellCoord {
    pub y: i32,
    pub x: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaintedTile {
    pub x: i32,
    pub y: i32,
    pub tile: String,
    pub atlas: AtlasCell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTile {
    pub name: String,
    pub cells: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaintedGrid {
    pub tiles: BTreeMap<CellCoord, PaintedTile>,
    pub unknown: Vec<UnknownTile>,
    pub invalid_legend_keys: Vec<String>,
}

impl PaintedGrid {
    pub fn filled_cells(&self) -> BTreeSet<CellCoord> {
        self.tiles.keys().copied().collect()
    }
}

enum CellLookup<'a> {
    Empty,
    Named(&'a str),
}

/// Paints an authored grid. Row 0 of the document is the top row, so for `R` rows the
/// engine row is `R - 1 - row`. Legend entries win over character-as-name, and a legend
/// entry of `null` or `""` always leaves the cell empty.
pub fn paint_grid(grid: &TileGridSpec, atlas: &TileAtlas) -> PaintedGrid {
    let mut painted = PaintedGrid::default();
    let mut legend = BTreeMap::<char, Option<&str>>::new();
    for (key, value) in &grid.legend {
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => {
                legend.insert(ch, value.as_deref().filter(|name| !name.is_empty()));
            }
            _ => painted.invalid_legend_keys.push(key.clone()),
        }
    }

    let empty_char = grid.empty_char();
    let height = grid.rows.len() as i32;
    let mut unknown = BTreeMap::<String, usize>::new();
    let mut scratch = [0u8; 4];

    for (spec_row, line) in grid.rows.iter().enumerate() {
        let y = height - 1 - spec_row as i32;
        for (x, ch) in line.chars().enumerate() {
            let lookup = match legend.get(&ch) {
                Some(None) => CellLookup::Empty,
                Some(Some(name)) => CellLookup::Named(name),
                None if ch == empty_char || ch == ' ' => CellLookup::Empty,
                None => CellLookup::Named(ch.encode_utf8(&mut scratch)),
            };
            let CellLookup::Named(name) = lookup else {
                continue;
            };
            match atlas.cell(name) {
                Some(cell) => {
                    let coord = CellCoord { y, x: x as i32 };
                    painted.tiles.insert(
                        coord,
                        PaintedTile {
                            x: coord.x,
                            y,
                            tile: name.to_string(),
                            atlas: cell,
                        },
                    );
                }
                None => *unknown.entry(name.to_string()).or_default() += 1,
            }
        }
    }

    painted.unknown = unknown
        .into_iter()
        .map(|(name, cells)| UnknownTile { name, cells })
        .collect();
    painted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Dir {
    East,
    North,
    West,
    South,
}

impl Dir {
    fn delta(self) -> (i32, i32) {
        match self {
            Dir::East => (1, 0),
            Dir::North => (0, 1),
            Dir::West => (-1, 0),
            Dir::South => (0, -1),
        }
    }

    /// 0 = left turn, 1 = straight, 2 = right turn, 3 = reversal.
    fn turn_rank(self, next: Dir) -> u8 {
        let (ax, ay) = self.delta();
        let (bx, by) = next.delta();
        let cross = ax * by - ay * bx;
        let dot = ax * bx + ay * by;
        match (cross, dot) {
            (c, _) if c > 0 => 0,
            (0, d) if d > 0 => 1,
            (c, _) if c < 0 => 2,
            _ => 3,
        }
    }
}

type Vertex = (i32, i32);

/// Traces the boundary of every 4-connected region of `cells` into closed loops of
/// grid-corner vertices. Outer boundaries run counter-clockwise and holes clockwise.
/// Where two regions touch only at a corner the tracer turns left, so they stay
/// separate loops. Collinear vertices are dropped.
pub fn trace_outlines(cells: &BTreeSet<CellCoord>) -> Vec<Vec<Vertex>> {
    let filled = |x: i32, y: i32| cells.contains(&CellCoord { y, x });
    let mut outgoing = BTreeMap::<Vertex, Vec<Dir>>::new();
    for cell in cells {
        let (x, y) = (cell.x, cell.y);
        if !filled(x, y - 1) {
            outgoing.entry((x, y)).or_default().push(Dir::East);
        }
        if !filled(x + 1, y) {
            outgoing.entry((x + 1, y)).or_default().push(Dir::North);
        }
        if !filled(x, y + 1) {
            outgoing.entry((x + 1, y + 1)).or_default().push(Dir::West);
        }
        if !filled(x - 1, y) {
            outgoing.entry((x, y + 1)).or_default().push(Dir::South);
        }
    }
    for dirs in outgoing.values_mut() {
        dirs.sort_unstable();
    }

    let edges = outgoing
        .iter()
        .flat_map(|(vertex, dirs)| dirs.iter().map(move |dir| (*vertex, *dir)))
        .collect::<Vec<_>>();
    let mut used = BTreeSet::<(Vertex, Dir)>::new();
    let mut loops = Vec::new();

    for start in edges {
        if used.contains(&start) {
            continue;
        }
        let mut walk = Vec::new();
        let mut edge = start;
        loop {
            used.insert(edge);
            walk.push(edge);
            let (vertex, dir) = edge;
            let (dx, dy) = dir.delta();
            let next_vertex = (vertex.0 + dx, vertex.1 + dy);
            let Some(next_dir) = outgoing
                .get(&next_vertex)
                .and_then(|dirs| dirs.iter().copied().min_by_key(|candidate| dir.turn_rank(*candidate)))
            else {
                break;
            };
            let next = (next_vertex, next_dir);
            if used.contains(&next) {
                break;
            }
            edge = next;
        }
        loops.push(simplify(&walk));
    }
    loops
}

fn simplify(walk: &[(Vertex, Dir)]) -> Vec<Vertex> {
    let count = walk.len();
    (0..count)
        .filter(|index| {
            let previous = walk[(index + count - 1) % count].1;
            previous != walk[*index].1
        })
        .map(|index| walk[index].0)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TileCollision {
    None,
    /// One box per painted cell, in layer-local space.
    Simple { cells: Vec<Rect> },
    /// Merged outlines in layer-local space; the layer carries a static body.
    Composite { outlines: Vec<Vec<Vec2>> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub tileset: String,
    pub atlas_path: String,
    pub cell_size: Vec2,
    pub sorting_layer: String,
    pub order_in_layer: i32,
    pub tiles: Vec<PaintedTile>,
    pub collision: TileCollision,
}

fn collision_for(kind: TileColliderKind, painted: &PaintedGrid, cell_size: Vec2) -> TileCollision {
    match kind {
        TileColliderKind::None => TileCollision::None,
        TileColliderKind::Simple => TileCollision::Simple {
            cells: painted
                .tiles
                .keys()
                .map(|coord| Rect {
                    min: Vec2::new(coord.x as f32 * cell_size.x, coord.y as f32 * cell_size.y),
                    max: Vec2::new(
                        (coord.x + 1) as f32 * cell_size.x,
                        (coord.y + 1) as f32 * cell_size.y,
                    ),
                })
                .collect(),
        },
        TileColliderKind::Composite => TileCollision::Composite {
            outlines: trace_outlines(&painted.filled_cells())
                .into_iter()
                .map(|outline| {
                    outline
                        .into_iter()
                        .map(|(x, y)| Vec2::new(x as f32 * cell_size.x, y as f32 * cell_size.y))
                        .collect()
                })
                .collect(),
        },
    }
}

/// Builds one tile layer under the scene's grid root, creating the root on first use.
/// Faults are recorded and skip only this layer.
pub fn build_tilemap(
    ctx: &mut BuildContext<'_>,
    graph: &mut SceneGraph,
    grid_root: &mut Option<EntityId>,
    spec: &TilemapSpec,
    index: usize,
    tilesets: &[&TilesetSpec],
) -> Option<EntityId> {
    let layer_name = if spec.name.trim().is_empty() {
        format!("Tilemap{index}")
    } else {
        spec.name.trim().to_string()
    };

    let Some(tileset) = tilesets.iter().find(|tileset| tileset.name == spec.tileset) else {
        ctx.diagnostics.push(
            Diagnostic::warning(
                DiagnosticCode::UnknownTileset,
                format!("no tileset named '{}'", spec.tileset),
            )
            .subject(layer_name.as_str())
            .field("tileset")
            .value(spec.tileset.as_str()),
        );
        return None;
    };

    let asset = ctx.import_asset(&tileset.image, &layer_name, "tileset.image")?;
    let sliced = match slice_atlas(tileset, asset.pixel_size, ctx.pixels_per_unit) {
        Ok(sliced) => sliced,
        Err(error) => {
            ctx.diagnostics.push(
                Diagnostic::warning(DiagnosticCode::InvalidTileset, error.to_string())
                    .subject(layer_name.as_str())
                    .value(tileset.name.as_str()),
            );
            return None;
        }
    };
    for name in &sliced.out_of_range {
        ctx.diagnostics.push(
            Diagnostic::warning(
                DiagnosticCode::TileOutOfAtlas,
                format!("tile '{name}' lies outside the atlas of '{}'", tileset.name),
            )
            .subject(tileset.name.as_str())
            .value(name.as_str()),
        );
    }

    let atlas = sliced.atlas;
    let painted = paint_grid(&spec.grid, &atlas);
    for key in &painted.invalid_legend_keys {
        ctx.diagnostics.push(
            Diagnostic::warning(
                DiagnosticCode::InvalidLegendKey,
                "legend keys must be exactly one character",
            )
            .subject(layer_name.as_str())
            .field("grid.legend")
            .value(key.as_str()),
        );
    }
    for unknown in &painted.unknown {
        ctx.diagnostics.push(
            Diagnostic::warning(
                DiagnosticCode::UnknownTileName,
                format!(
                    "tileset '{}' has no tile '{}'; {} cell(s) left empty",
                    atlas.tileset, unknown.name, unknown.cells
                ),
            )
            .subject(layer_name.as_str())
            .field("grid.rows")
            .value(unknown.name.as_str()),
        );
    }

    let cell_size = spec
        .cell_size
        .map(Vec2::from)
        .filter(|size| size.x > 0.0 && size.y > 0.0)
        .unwrap_or_else(|| atlas.cell_world_size());
    let sorting_layer = ctx.register_sorting_layer(spec.sorting_layer.as_deref().unwrap_or_default());
    let collision = collision_for(spec.collider, &painted, cell_size);

    let root = *grid_root.get_or_insert_with(|| graph.spawn(GRID_ROOT_NAME, None));
    let layer = graph.spawn(&layer_name, Some(root));
    let tile_count = painted.tiles.len();
    if let Some(entity) = graph.get_mut(layer) {
        let origin = Vec2::from(spec.origin);
        entity.transform.position = Vec3::new(origin.x, origin.y, 0.0);
        if spec.collider == TileColliderKind::Composite {
            entity.components.body = Some(PhysicsBody::static_body());
        }
        entity.components.tile_layer = Some(TileLayer {
            tileset: atlas.tileset.clone(),
            atlas_path: asset.canonical_path.clone(),
            cell_size,
            sorting_layer,
            order_in_layer: spec.order_in_layer,
            tiles: painted.tiles.into_values().collect(),
            collision,
        });
    }

    debug!(
        tileset = %atlas.tileset,
        columns = atlas.columns,
        rows = atlas.rows,
        names = atlas.name_count(),
        "tile_atlas_sliced"
    );
    info!(
        layer = %layer_name,
        tiles = tile_count,
        collider = ?spec.collider,
        "tilemap_built"
    );
    Some(layer)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assets::testing::MemoryAssetStore;
    use crate::behavior::{builtin_catalog, builtin_commands, BehaviorRegistry};
    use crate::registries::ProjectRegistries;

    fn tileset() -> TilesetSpec {
        serde_json::from_value(json!({
            "name": "terrain",
            "image": "tiles/terrain.png",
            "tileWidth": 16,
            "tileHeight": 16,
            "tiles": [
                {"name": "x", "x": 0, "y": 0},
                {"name": "y", "x": 16, "y": 0},
                {"name": "A", "x": 0, "y": 16},
                {"name": "far", "x": 640, "y": 0}
            ]
        }))
        .expect("tileset")
    }

    fn atlas() -> TileAtlas {
        slice_atlas(&tileset(), (32, 32), 16.0).expect("slice").atlas
    }

    fn grid(value: serde_json::Value) -> TileGridSpec {
        serde_json::from_value(value).expect("grid")
    }

    fn coords(cells: &[(i32, i32)]) -> BTreeSet<CellCoord> {
        cells.iter().map(|(x, y)| CellCoord { x: *x, y: *y }).collect()
    }

    #[test]
    fn slicing_uses_top_left_origin_and_auto_names() {
        let sliced = slice_atlas(&tileset(), (32, 32), 100.0).expect("slice");
        let atlas = sliced.atlas;
        assert_eq!((atlas.columns, atlas.rows), (2, 2));
        assert_eq!(atlas.cell("y"), Some(AtlasCell { col: 1, row: 0 }));
        assert_eq!(atlas.cell("A"), Some(AtlasCell { col: 0, row: 1 }));
        assert_eq!(atlas.cell("terrain_3"), Some(AtlasCell { col: 1, row: 1 }));
        assert_eq!(sliced.out_of_range, vec!["far".to_string()]);
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let mut spec = tileset();
        spec.tile_width = None;
        spec.tile_size = None;
        assert!(matches!(
            slice_atlas(&spec, (32, 32), 100.0),
            Err(TilesetError::ZeroTileSize { .. })
        ));
    }

    #[test]
    fn authored_top_row_lands_on_highest_engine_row() {
        let painted = paint_grid(
            &grid(json!({"rows": ["A", "B"], "legend": {"A": "x", "B": "y"}})),
            &atlas(),
        );
        assert_eq!(painted.tiles[&CellCoord { x: 0, y: 0 }].tile, "y");
        assert_eq!(painted.tiles[&CellCoord { x: 0, y: 1 }].tile, "x");
    }

    #[test]
    fn null_legend_entry_beats_matching_tile_name() {
        let painted = paint_grid(
            &grid(json!({"rows": ["Ay", "yA"], "legend": {"A": null, "y": ""}})),
            &atlas(),
        );
        assert!(painted.tiles.is_empty());
        assert!(painted.unknown.is_empty());
    }

    #[test]
    fn ragged_rows_empty_chars_and_unknown_names() {
        let painted = paint_grid(
            &grid(json!({"rows": ["x.y", "", "x?? x"], "empty": "."})),
            &atlas(),
        );
        let filled = painted.filled_cells();
        assert_eq!(filled, coords(&[(0, 2), (2, 2), (0, 0), (4, 0)]));
        assert_eq!(
            painted.unknown,
            vec![UnknownTile {
                name: "?".to_string(),
                cells: 2
            }]
        );
    }

    #[test]
    fn painting_is_deterministic() {
        let spec = grid(json!({"rows": ["xy.A", "AAxy"], "legend": {"A": "terrain_3"}}));
        assert_eq!(paint_grid(&spec, &atlas()), paint_grid(&spec, &atlas()));
    }

    #[test]
    fn long_legend_keys_are_reported() {
        let painted = paint_grid(&grid(json!({"rows": ["x"], "legend": {"xx": "y"}})), &atlas());
        assert_eq!(painted.invalid_legend_keys, vec!["xx".to_string()]);
        assert_eq!(painted.tiles.len(), 1);
    }

    #[test]
    fn single_cell_outline_is_counter_clockwise_square() {
        let outlines = trace_outlines(&coords(&[(0, 0)]));
        assert_eq!(outlines, vec![vec![(0, 0), (1, 0), (1, 1), (0, 1)]]);
    }

    #[test]
    fn adjacent_cells_merge_and_drop_collinear_vertices() {
        let outlines = trace_outlines(&coords(&[(0, 0), (1, 0), (2, 0)]));
        assert_eq!(outlines, vec![vec![(0, 0), (3, 0), (3, 1), (0, 1)]]);
    }

    #[test]
    fn ring_produces_outer_loop_and_clockwise_hole() {
        let mut cells = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                if (x, y) != (1, 1) {
                    cells.push((x, y));
                }
            }
        }
        let outlines = trace_outlines(&coords(&cells));
        assert_eq!(outlines.len(), 2);
        assert_eq!(outlines[0], vec![(0, 0), (3, 0), (3, 3), (0, 3)]);
        assert_eq!(outlines[1], vec![(1, 1), (1, 2), (2, 2), (2, 1)]);
    }

    #[test]
    fn diagonal_neighbours_stay_separate_regions() {
        let outlines = trace_outlines(&coords(&[(0, 0), (1, 1)]));
        assert_eq!(outlines.len(), 2);
        assert!(outlines.iter().all(|outline| outline.len() == 4));
    }

    #[test]
    fn build_tilemap_attaches_layer_under_grid_root() {
        let store = MemoryAssetStore::default().with_project("Assets/tiles/terrain.png", (32, 32));
        let mut ctx = BuildContext::new(
            ProjectRegistries::default(),
            BehaviorRegistry::build(&[builtin_catalog()], &[]),
            builtin_commands(),
            &store,
            16.0,
        );
        let mut graph = SceneGraph::default();
        let mut root = None;
        let spec = serde_json::from_value::<TilemapSpec>(json!({
            "name": "Ground",
            "tileset": "terrain",
            "origin": {"x": -4, "y": -3},
            "grid": {"rows": ["xx", "xx"]},
            "collider": "composite",
            "sortingLayer": "Terrain"
        }))
        .expect("tilemap");
        let tileset = tileset();

        let layer = build_tilemap(&mut ctx, &mut graph, &mut root, &spec, 0, &[&tileset])
            .expect("layer");
        let entity = graph.get(layer).expect("entity");
        assert_eq!(entity.parent, root);
        assert_eq!(graph.get(root.expect("root")).expect("root").name, GRID_ROOT_NAME);
        assert!(entity.components.body.is_some());
        let tile_layer = entity.components.tile_layer.as_ref().expect("tile layer");
        assert_eq!(tile_layer.tiles.len(), 4);
        assert_eq!(tile_layer.cell_size, Vec2::new(1.0, 1.0));
        assert_eq!(
            tile_layer.collision,
            TileCollision::Composite {
                outlines: vec![vec![
                    Vec2::new(0.0, 0.0),
                    Vec2::new(2.0, 0.0),
                    Vec2::new(2.0, 2.0),
                    Vec2::new(0.0, 2.0)
                ]]
            }
        );
        assert!(ctx.registries.sorting_layers.get("Terrain").is_some());
        assert_eq!(ctx.diagnostics.count_code(DiagnosticCode::TileOutOfAtlas), 1);
    }

    #[test]
    fn unknown_tileset_skips_layer() {
        let store = MemoryAssetStore::default();
        let mut ctx = BuildContext::new(
            ProjectRegistries::default(),
            BehaviorRegistry::default(),
            builtin_commands(),
            &store,
            100.0,
        );
        let mut graph = SceneGraph::default();
        let mut root = None;
        let spec = serde_json::from_value::<TilemapSpec>(json!({"tileset": "missing"}))
            .expect("tilemap");
        assert!(build_tilemap(&mut ctx, &mut graph, &mut root, &spec, 2, &[]).is_none());
        assert!(graph.is_empty());
        assert_eq!(ctx.diagnostics.count_code(DiagnosticCode::UnknownTileset), 1);
    }
}
