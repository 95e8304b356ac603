use meshi_terrain::source::{Fbm, ProceduralTerrainDataProvider};
use meshi_terrain::{TerrainBuilder, TerrainBuilderInfo};
use glam::Vec3;
use std::{env, sync::Arc, thread::sleep, time::Duration};
use tracing::info;

fn main() {
    tracing_subscriber::fmt::init();

    let info = match env::args().nth(1) {
        Some(path) => match TerrainBuilderInfo::from_json_file(&path) {
            Ok(info) => info,
            Err(err) => {
                eprintln!("Failed to load '{}': {}", path, err);
                return;
            }
        },
        None => TerrainBuilderInfo {
            clipmap_terrain_count: 5,
            clipmap_texture_count: 3,
            ..Default::default()
        },
    };

    let provider = Arc::new(ProceduralTerrainDataProvider::new(
        Fbm::default().into_function(),
        Vec3::new(1.0, 300.0, 1.0),
        -1.0,
        1.0,
    ));
    let mut terrain = match TerrainBuilder::new(provider, info).build() {
        Ok(terrain) => terrain,
        Err(err) => {
            eprintln!("Failed to build terrain: {}", err);
            return;
        }
    };

    let mut camera = Vec3::new(0.0, 400.0, 0.0);
    for frame in 0..600 {
        camera.x += 24.0;
        camera.z += 6.0;
        terrain.update(camera);

        let regions = terrain.take_updated_regions();
        if frame % 60 == 0 {
            let ground = terrain.height_at(camera.x, camera.z);
            let pick = terrain.pick(camera, Vec3::new(0.0, -1.0, 0.5));
            info!(
                "frame {} camera ({:.0}, {:.0}) ground {:?} pick {:?} regions {} update {:?}",
                frame,
                camera.x,
                camera.z,
                ground,
                pick,
                regions.len(),
                terrain.last_update_duration()
            );
            for stats in terrain.stats() {
                info!(
                    "  level {}: {} resident, {} pending, {} missing, {} discarded",
                    stats.level, stats.resident, stats.pending, stats.missing, stats.discarded
                );
            }
        }
        sleep(Duration::from_millis(16));
    }
}
