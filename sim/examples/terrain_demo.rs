//! Terrain engine walkthrough: load, deform, propagate, persist.
//!
//! Run with: RUST_LOG=tbg_terrain=debug cargo run --example terrain_demo

use tbg_terrain::{Rect, RegionId, TerrainConfig, TerrainMap, TerrainWorld};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SIZE: usize = 64;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("tbg_terrain=info".parse()?))
        .init();

    let corners: Vec<f32> = (0..(SIZE + 1) * (SIZE + 1))
        .map(|i| {
            let (x, z) = ((i % (SIZE + 1)) as f32, (i / (SIZE + 1)) as f32);
            (x * 0.15).sin() * 40.0 + (z * 0.1).cos() * 25.0 + 10.0
        })
        .collect();
    let types = vec![0u8; (SIZE / 2) * (SIZE / 2)];

    let config = TerrainConfig { mip_levels: 5, ..Default::default() };
    let mut map = TerrainMap::load("demo_valley", SIZE, SIZE, &corners, Some(&types), config)?;
    // the eastern half of the map is under fog of war
    map.set_visibility(|id: RegionId| id.x < 4);
    map.begin_match();

    let mut world = TerrainWorld::new(map);
    world.render_frame();
    info!(updates = world.take_updates().len(), "initial frame drawn");

    // two craters, one in view and one under fog
    for (cx, cz) in [(16, 16), (48, 40)] {
        let rect = Rect::new(cx - 3, cz - 3, cx + 3, cz + 3);
        let map = world.map().ok_or("terrain missing")?;
        let mut values = Vec::with_capacity(rect.area());
        for (x, z) in rect.cells() {
            let d2 = ((x - cx).pow(2) + (z - cz).pow(2)) as f32;
            let depth = (9.0 - d2).max(0.0) * 1.5;
            values.push(map.field().read_synced(x as usize, z as usize)? - depth);
        }
        world.map_mut().ok_or("terrain missing")?.set_heights(rect, &values)?;
    }

    for _ in 0..3 {
        world.step(1.0 / 30.0);
        world.render_frame();
    }
    let updates = world.take_updates();
    info!(?updates, "propagated while fogged");

    // lift the fog and let the deferred crater through
    if let Some(mut map) = world.map_mut() {
        map.set_visibility(|_: RegionId| true);
    }
    world.render_frame();
    info!(updates = ?world.take_updates(), "propagated after reveal");

    for _ in 0..60 {
        world.step(1.0 / 30.0);
    }

    let map = world.map().ok_or("terrain missing")?;
    let delta = map.save_changes()?;
    let payload = delta.to_json()?;
    info!(
        tick = world.tick(),
        min = map.bounds().current().min,
        max = map.bounds().current().max,
        height_checksum = map.height_checksum(),
        baseline = map.baseline_checksum(),
        changed_words = delta.changed_words(),
        payload_bytes = payload.len(),
        "terrain state"
    );
    Ok(())
}
