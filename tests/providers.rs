mod common;

use std::sync::Arc;

use common::pump;
use glam::Vec3;
use image::{ImageBuffer, Luma, Rgba};
use meshi_terrain::heightmap::{
    BasicHeightmap, BasicHeightmapPyramid, Heightmap, HeightmapPyramid, MipFilter,
    ProceduralHeightmap, INVALID_HEIGHT,
};
use meshi_terrain::source::{Fbm, ImageTerrainDataProvider, ProceduralTerrainDataProvider};
use meshi_terrain::{Error, LoaderMode, TerrainBuilder, TerrainBuilderInfo, TextureFormat};

#[test]
fn wrapping_heightmaps_use_positive_modulo() {
    let size = 7;
    let data = (0..size * size).map(|i| i as f32).collect();
    let map = BasicHeightmap::from_data(data, size).expect("heightmap");
    let s = size as i32;
    for y in -20..20 {
        for x in -20..20 {
            let wrapped = map.height(((x % s) + s) % s, ((y % s) + s) % s);
            assert_eq!(map.height(x, y), wrapped, "({x}, {y})");
        }
    }

    let clamped = BasicHeightmap::from_data(vec![1.0; 4], 2)
        .expect("heightmap")
        .with_wrap(false);
    assert_eq!(clamped.height(-1, 0), INVALID_HEIGHT);
    assert_eq!(clamped.height(0, 2), INVALID_HEIGHT);
}

#[test]
fn pyramids_decimate_and_clamp() {
    let data = (0..64).map(|i| i as f32).collect();
    let base = BasicHeightmap::from_data(data, 8).expect("heightmap");
    let pyramid = BasicHeightmapPyramid::from_base(base.clone(), 3, MipFilter::PointSample)
        .expect("pyramid");
    assert_eq!(pyramid.heightmap_count(), 3);
    assert_eq!(pyramid.size(2), Some(2));
    // level 1 (1, 1) is level 0 (2, 2)
    assert_eq!(pyramid.height(1, 1, 1), 18.0);
    assert_eq!(pyramid.height(9, 1, 0), pyramid.height(2, 1, 0));
    // generated levels wrap like the base
    for y in -9i32..9 {
        for x in -9i32..9 {
            let wrapped = pyramid.height(1, x.rem_euclid(4), y.rem_euclid(4));
            assert_eq!(pyramid.height(1, x, y), wrapped, "({x}, {y})");
        }
    }

    let boxed = BasicHeightmapPyramid::from_base(base, 2, MipFilter::Box).expect("pyramid");
    // mean of 0, 1, 8, 9
    assert_eq!(boxed.height(1, 0, 0), 4.5);
}

#[test]
fn procedural_heightmaps_are_unbounded() {
    let map = ProceduralHeightmap::new(|x, y| (x * 2.0 + y) as f32);
    assert_eq!(map.size(), None);
    assert!(map.is_ready());
    assert_eq!(map.height(-3, 4), -2.0);
    assert!(matches!(
        BasicHeightmapPyramid::from_base(map, 2, MipFilter::PointSample),
        Err(Error::ConfigurationError(_))
    ));
}

#[test]
fn procedural_terrain_streams_with_a_shared_loader() {
    let function: Arc<dyn Fn(f64, f64) -> f32 + Send + Sync> =
        Arc::new(|x, z| ((x * 0.01).sin() + (z * 0.01).cos()) as f32);
    let provider = Arc::new(ProceduralTerrainDataProvider::new(
        function,
        Vec3::new(2.0, 50.0, 2.0),
        -2.0,
        2.0,
    ));
    let info = TerrainBuilderInfo {
        clipmap_terrain_count: 3,
        clipmap_texture_count: 2,
        loader: LoaderMode::Shared { threads: 2 },
        ..Default::default()
    };
    let mut terrain = TerrainBuilder::new(provider, info).build().expect("terrain");
    assert_eq!(terrain.level_count(), 3);
    assert_eq!(terrain.cache().cache_size(), 5);

    let camera = Vec3::new(-300.0, 100.0, 900.0);
    assert!(pump(
        &mut terrain,
        |t| t.update(camera),
        |t| t.cache().is_ready() && t.texture_clipmaps()[0].cache().is_ready()
    ));

    let expected = ((-150.0f64 * 0.01).sin() + (450.0f64 * 0.01).cos()) as f32 * 50.0;
    let height = terrain.height_at(-300.0, 900.0).expect("height");
    assert!((height - expected).abs() < 1e-3, "{height} vs {expected}");
    assert_eq!(
        terrain.texture_clipmaps()[0].configuration().format,
        TextureFormat::Rgba8
    );
    assert!(terrain.color_at(-300.0, 900.0).is_some());
}

#[test]
fn fbm_heights_stay_in_range() {
    let fbm = Fbm {
        octaves: 3,
        ..Default::default()
    };
    let function = fbm.into_function();
    for i in -50..50 {
        let h = function(i as f64 * 7.3, i as f64 * 3.1);
        assert!((-1.0..=1.0).contains(&h));
    }
}

#[test]
fn image_provider_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let height_path = dir.path().join("heights.png");
    let color_path = dir.path().join("color.png");
    ImageBuffer::<Luma<u16>, _>::from_fn(64, 64, |x, _| Luma([(x * 1000) as u16]))
        .save(&height_path)
        .expect("write heights");
    ImageBuffer::<Rgba<u8>, _>::from_fn(64, 64, |_, y| Rgba([0, y as u8, 200, 255]))
        .save(&color_path)
        .expect("write colours");

    let provider = Arc::new(
        ImageTerrainDataProvider::open_with_tile_size(
            &height_path,
            Some(&color_path),
            Vec3::new(1.0, 100.0, 1.0),
            16,
        )
        .expect("provider"),
    );
    let info = TerrainBuilderInfo {
        clipmap_terrain_size: 15,
        clipmap_texture_size: 16,
        ..Default::default()
    };
    let mut terrain = TerrainBuilder::new(provider, info).build().expect("terrain");
    let camera = Vec3::new(24.0, 0.0, 24.0);
    assert!(pump(
        &mut terrain,
        |t| t.update(camera),
        |t| t.cache().is_ready() && t.texture_clipmaps()[0].cache().is_ready()
    ));

    let raw = terrain.sample_height(0, 25, 24);
    assert!((raw - 25_000.0 / 65_535.0).abs() < 1e-5, "{raw}");
    let color = terrain.color_at(24.5, 30.5).expect("colour");
    assert_eq!((color.g, color.b), (30, 200));

    let missing = dir.path().join("missing.png");
    assert!(matches!(
        ImageTerrainDataProvider::open(&missing, None, Vec3::ONE),
        Err(Error::LoadingError(_))
    ));
}
