mod common;

use common::{chain, info, pump, sample, Plan, TestSource};
use meshi_terrain::cache::{GridCacheInfo, TerrainGridCache, TileState, TileWindow};
use meshi_terrain::heightmap::{HeightmapPyramid, INVALID_HEIGHT};
use meshi_terrain::{DoubleBufferedList, Region, Tile};
use std::sync::Arc;

fn window_tiles(cache: &TerrainGridCache) -> Vec<Tile> {
    cache.window().expect("window").tiles().collect()
}

#[test]
fn reads_fall_back_to_the_resident_level() {
    let source = TestSource::gated(4, 3, 2);
    let mut cache = chain(&source, 3, info(5, 4));
    cache.update(0, 0);

    assert!(cache.level_cache(2).expect("coarsest").is_ready());
    assert_eq!(cache.tile_state(Tile::new(0, 0)), TileState::Requested);

    // every sample of the level 0 window resolves through level 2
    for z in -8i32..12 {
        for x in -8i32..12 {
            let expected = sample(2, x.div_euclid(4), z.div_euclid(4), 0);
            assert_eq!(cache.height(x, z), Some(expected), "({x}, {z})");
            assert!(cache.sub_height(x as f32 + 0.5, z as f32 + 0.25).is_some());
        }
    }

    source.open();
    assert!(pump(&mut cache, |c| c.update(0, 0), |c| c.is_ready()));
    assert_eq!(cache.height(1, 3), Some(sample(0, 1, 3, 0)));
}

#[test]
fn one_request_per_tile_while_pending() {
    let source = TestSource::gated(4, 2, 1);
    let mut cache = chain(&source, 2, info(5, 4));
    for _ in 0..50 {
        cache.update(2, 2);
    }

    let tiles = window_tiles(&cache);
    assert_eq!(tiles.len(), 25);
    source.open();
    assert!(pump(
        &mut cache,
        |c| c.update(2, 2),
        |c| c.stats().resident == 25
    ));
    for tile in tiles {
        assert_eq!(source.requests(0, tile), 1, "{tile:?}");
    }
    assert_eq!(source.level_requests(0), 25);
    assert_eq!(cache.stats().requests_issued, 25);
}

#[test]
fn resident_tiles_stay_bounded_while_moving() {
    let source = TestSource::new(32, 2);
    let mut cache = chain(&source, 2, info(5, 32));

    for x in (0..100 * 32).step_by(8) {
        cache.update(x, 0);
        for level in cache.levels() {
            let stats = level.stats();
            assert_eq!(stats.resident + stats.pending, 25, "level {}", stats.level);
        }
        let window = cache.window().expect("window");
        assert_eq!(window.min.x, x / 32 - 2);
    }

    assert!(pump(
        &mut cache,
        |c| c.update(100 * 32 - 8, 0),
        |c| c.stats().resident == 25
    ));
}

#[test]
fn late_completions_are_dropped() {
    let source = TestSource::gated(4, 2, 1);
    let mut cache = chain(&source, 2, info(5, 4));
    cache.update(0, 0);
    let first = window_tiles(&cache);

    cache.update(4000, 0);
    for tile in &first {
        assert_eq!(cache.tile_state(*tile), TileState::Empty);
    }

    source.open();
    assert!(pump(
        &mut cache,
        |c| c.update(4000, 0),
        |c| c.stats().discarded == 25 && c.stats().resident == 25
    ));
    let window = TileWindow::centered(Tile::new(1000, 0), 5);
    assert_eq!(cache.window(), Some(window));
}

#[test]
fn returning_tiles_reuse_their_pending_request() {
    let source = TestSource::gated(4, 2, 1);
    let mut cache = chain(&source, 2, info(5, 4));
    let tile = Tile::new(0, 0);
    cache.update(0, 0);
    cache.update(4000, 0);
    assert_eq!(cache.tile_state(tile), TileState::Empty);

    // back before the first request has been answered
    cache.update(0, 0);
    assert_eq!(cache.tile_state(tile), TileState::Requested);
    assert_eq!(cache.stats().requests_issued, 50);

    source.open();
    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.stats().resident == 25 && c.stats().discarded == 25
    ));
    for tile in window_tiles(&cache) {
        assert_eq!(source.requests(0, tile), 1, "{tile:?}");
    }
    assert_eq!(cache.height(1, 1), Some(sample(0, 1, 1, 0)));
}

#[test]
fn transient_failures_are_retried() {
    let source = TestSource::new(4, 2);
    source.plan(0, Tile::new(0, 0), Plan::Fail(2));
    let mut cache = chain(
        &source,
        2,
        GridCacheInfo {
            retry_delay_cycles: 2,
            ..info(5, 4)
        },
    );

    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.tile_state(Tile::new(0, 0)) == TileState::Loaded
    ));
    assert_eq!(source.requests(0, Tile::new(0, 0)), 3);
    assert_eq!(cache.stats().failures, 2);
    assert_eq!(cache.height(0, 0), Some(sample(0, 0, 0, 0)));
}

#[test]
fn retries_give_up_and_fall_back() {
    let source = TestSource::new(4, 2);
    source.plan(0, Tile::new(0, 0), Plan::AlwaysFail);
    let mut cache = chain(
        &source,
        2,
        GridCacheInfo {
            max_retries: 1,
            retry_delay_cycles: 1,
            ..info(5, 4)
        },
    );

    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.stats().failures == 2 && c.tile_state(Tile::new(0, 0)) == TileState::Empty
    ));
    for _ in 0..20 {
        cache.update(0, 0);
    }
    assert_eq!(source.requests(0, Tile::new(0, 0)), 2);
    assert_eq!(cache.height(1, 1), Some(sample(1, 0, 0, 0)));
}

#[test]
fn missing_tiles_are_not_requested_again() {
    let source = TestSource::new(4, 2);
    source.plan(0, Tile::new(1, 0), Plan::Missing);
    let mut cache = chain(&source, 2, info(5, 4));

    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.tile_state(Tile::new(1, 0)) == TileState::Missing
    ));
    for _ in 0..20 {
        cache.update(0, 0);
    }
    assert_eq!(source.requests(0, Tile::new(1, 0)), 1);
    assert_eq!(cache.stats().missing, 1);
    assert_eq!(cache.height(5, 0), Some(sample(1, 2, 0, 0)));
}

#[test]
fn panicking_source_counts_as_unavailable() {
    let source = TestSource::new(4, 2);
    source.plan(0, Tile::new(-1, 0), Plan::Panic);
    let mut cache = chain(
        &source,
        2,
        GridCacheInfo {
            max_retries: 0,
            ..info(5, 4)
        },
    );

    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.stats().failures == 1 && c.stats().resident == 24
    ));
    assert_eq!(cache.tile_state(Tile::new(-1, 0)), TileState::Empty);
    assert_eq!(cache.height(-1, 0), Some(sample(1, -1, 0, 0)));
}

#[test]
fn invalidated_tiles_refresh_in_place() {
    let source = TestSource::gated(4, 2, 1);
    source.open();
    let mut cache = chain(&source, 2, info(5, 4));
    let tile = Tile::new(0, 0);
    assert!(pump(&mut cache, |c| c.update(0, 0), |c| c.stats().resident == 25));

    source.close();
    let version = source.bump_version();
    source.invalidate(0, tile);
    cache.update(0, 0);
    assert_eq!(cache.tile_state(tile), TileState::Refreshing);
    // the old copy is served while the new one loads
    assert_eq!(cache.height(2, 2), Some(sample(0, 2, 2, 0)));

    // a second invalidation while pending only flags the slot
    source.invalidate(0, tile);
    cache.update(0, 0);
    assert_eq!(source.requests(0, tile), 1);

    source.open();
    assert!(pump(
        &mut cache,
        |c| c.update(0, 0),
        |c| c.tile_state(tile) == TileState::Loaded && source.requests(0, tile) == 3
    ));
    assert_eq!(cache.height(2, 2), Some(sample(0, 2, 2, version)));
}

#[test]
fn merged_tiles_are_reported_as_regions() {
    let source = TestSource::new(4, 2);
    let mut cache = chain(&source, 2, info(3, 4));
    let mailbox = Arc::new(DoubleBufferedList::new());
    cache.set_region_mailbox(Arc::clone(&mailbox));

    assert!(pump(&mut cache, |c| c.update(0, 0), |c| c.stats().resident == 9));
    let regions = mailbox.switch_and_get();
    assert!(regions.contains(&Region::new(0, 0, 0, 4, 4)));
    assert!(regions.contains(&Region::new(1, -4, -4, 4, 4)));
    assert!(regions.iter().filter(|r| r.level == 0).count() == 9);
}

#[test]
fn regions_of_evicted_tiles_are_withdrawn() {
    let source = TestSource::new(4, 2);
    let mut cache = chain(&source, 2, info(5, 4));
    let mailbox = Arc::new(DoubleBufferedList::new());
    cache.set_region_mailbox(Arc::clone(&mailbox));

    // nobody drains the mailbox while the camera travels
    for x in (0..2000).step_by(3) {
        cache.update(x, x / 2);
    }
    assert!(pump(
        &mut cache,
        |c| c.update(1998, 999),
        |c| c.stats().resident == 25
    ));

    let regions = mailbox.switch_and_get();
    assert!(regions.len() <= 50, "{} regions queued", regions.len());
    for region in regions {
        let level = cache.level_cache(region.level).expect("level");
        let tile = Tile::containing(region.x, region.y, 4);
        assert!(level.window().expect("window").contains(tile), "{region:?}");
    }
}

#[test]
fn copy_heights_mixes_levels() {
    let source = TestSource::gated(4, 2, 1);
    let mut cache = chain(&source, 2, info(5, 4));
    cache.update(0, 0);

    let mut block = vec![0.0; 16];
    assert_eq!(cache.copy_heights(0, 0, 4, 4, &mut block), 0);
    assert_eq!(block[5], sample(1, 0, 0, 0));

    source.open();
    assert!(pump(&mut cache, |c| c.update(0, 0), |c| c.stats().resident == 25));
    assert_eq!(cache.copy_heights(0, 0, 4, 4, &mut block), 16);
    assert_eq!(block[5], sample(0, 1, 1, 0));

    // far outside every level
    cache.copy_heights(1000, 1000, 4, 4, &mut block);
    assert!(block.iter().all(|h| *h == INVALID_HEIGHT));
}

#[test]
fn streaming_pyramid_reads_the_chain() {
    let source = TestSource::new(4, 3);
    let mut cache = chain(&source, 3, info(5, 4));
    assert!(pump(&mut cache, |c| c.update(0, 0), |c| c.stats().resident == 25));

    let pyramid = meshi_terrain::heightmap::StreamingHeightmapPyramid::new(&cache);
    assert_eq!(pyramid.heightmap_count(), 3);
    assert_eq!(pyramid.size(0), Some(20));
    assert_eq!(pyramid.height(0, 3, 1), sample(0, 3, 1, 0));
    assert_eq!(pyramid.height(2, 0, 0), sample(2, 0, 0, 0));
    // levels past the chain clamp to the coarsest
    assert_eq!(pyramid.height(7, 0, 0), sample(2, 0, 0, 0));
}
