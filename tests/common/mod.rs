#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use meshi_terrain::cache::{
    CacheKind, GridCache, GridCacheInfo, HeightFetch, TerrainGridCache, TileLoader,
};
use meshi_terrain::source::{TerrainConfiguration, TerrainSource};
use meshi_terrain::{Error, Result, Tile};

/// What the source does with a given tile.
#[derive(Clone, Copy, Debug)]
pub enum Plan {
    /// Fail this many requests, then serve data.
    Fail(u32),
    /// Fail every request.
    AlwaysFail,
    Missing,
    Panic,
}

/// Height served for a sample, encoding where it came from.
pub fn sample(level: u32, x: i32, z: i32, version: u32) -> f32 {
    version as f32 * 100_000.0 + level as f32 * 1_000.0 + x as f32 + z as f32 * 0.001
}

/// Scriptable terrain source that counts requests per tile.
///
/// Requests below `gate_below` block while the gate is closed, which keeps
/// streaming levels pending for as long as a test needs.
pub struct TestSource {
    tile_size: u32,
    levels: u32,
    gate_below: u32,
    gate: Mutex<bool>,
    gate_changed: Condvar,
    requests: Mutex<HashMap<(u32, Tile), usize>>,
    plans: Mutex<HashMap<(u32, Tile), Plan>>,
    invalid: Mutex<HashMap<u32, Vec<Tile>>>,
    version: AtomicU32,
}

impl TestSource {
    pub fn new(tile_size: u32, levels: u32) -> Arc<Self> {
        Self::gated(tile_size, levels, 0)
    }

    /// Requests for levels below `gate_below` wait for [`TestSource::open`].
    pub fn gated(tile_size: u32, levels: u32, gate_below: u32) -> Arc<Self> {
        Arc::new(Self {
            tile_size,
            levels,
            gate_below,
            gate: Mutex::new(gate_below == 0),
            gate_changed: Condvar::new(),
            requests: Mutex::new(HashMap::new()),
            plans: Mutex::new(HashMap::new()),
            invalid: Mutex::new(HashMap::new()),
            version: AtomicU32::new(0),
        })
    }

    pub fn open(&self) {
        *self.gate.lock().unwrap() = true;
        self.gate_changed.notify_all();
    }

    pub fn close(&self) {
        *self.gate.lock().unwrap() = false;
    }

    pub fn plan(&self, level: u32, tile: Tile, plan: Plan) {
        self.plans.lock().unwrap().insert((level, tile), plan);
    }

    pub fn invalidate(&self, level: u32, tile: Tile) {
        self.invalid
            .lock()
            .unwrap()
            .entry(level)
            .or_default()
            .push(tile);
    }

    pub fn bump_version(&self) -> u32 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn requests(&self, level: u32, tile: Tile) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(&(level, tile))
            .copied()
            .unwrap_or(0)
    }

    pub fn level_requests(&self, level: u32) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|((l, _), _)| *l == level)
            .map(|(_, count)| *count)
            .sum()
    }

    fn wait_for_gate(&self, level: u32) {
        if level >= self.gate_below {
            return;
        }
        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.gate_changed.wait(open).unwrap();
        }
    }
}

impl TerrainSource for TestSource {
    fn configuration(&self) -> Result<TerrainConfiguration> {
        Ok(TerrainConfiguration::new(self.levels, self.tile_size, Vec3::ONE))
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<f32>> {
        self.wait_for_gate(level);
        let count = {
            let mut requests = self.requests.lock().unwrap();
            let count = requests.entry((level, tile)).or_insert(0);
            *count += 1;
            *count
        };

        let plan = self.plans.lock().unwrap().get(&(level, tile)).copied();
        match plan {
            Some(Plan::Fail(times)) if count as u32 <= times => {
                return Err(Error::source_unavailable(level, tile, "scripted failure"))
            }
            Some(Plan::AlwaysFail) => {
                return Err(Error::source_unavailable(level, tile, "scripted failure"))
            }
            Some(Plan::Missing) => return Err(Error::out_of_bounds(level, tile)),
            Some(Plan::Panic) => panic!("scripted panic for tile {:?}", tile),
            _ => {}
        }

        let version = self.version();
        let (ox, oz) = tile.origin(self.tile_size);
        let edge = self.tile_size as i32;
        let mut heights = Vec::with_capacity((edge * edge) as usize);
        for z in oz..oz + edge {
            for x in ox..ox + edge {
                heights.push(sample(level, x, z, version));
            }
        }
        Ok(heights)
    }

    fn invalid_tiles(&self, level: u32) -> Vec<Tile> {
        self.invalid
            .lock()
            .unwrap()
            .remove(&level)
            .unwrap_or_default()
    }
}

/// Build a cache chain over `source`: the coarsest level is resident, the
/// others stream through one shared loader.
pub fn chain(source: &Arc<TestSource>, levels: u32, template: GridCacheInfo) -> TerrainGridCache {
    let loader = Arc::new(TileLoader::new("test-loader", 2).expect("loader"));
    let fetch = Arc::new(HeightFetch::new(
        Arc::clone(source) as Arc<dyn TerrainSource>,
        template.tile_size,
    ));
    let mut parent: Option<Box<TerrainGridCache>> = None;
    for level in (0..levels).rev() {
        let kind = if parent.is_none() {
            CacheKind::Resident
        } else {
            CacheKind::Streaming(Arc::clone(&loader))
        };
        let info = GridCacheInfo { level, ..template };
        let cache = GridCache::new(info, Arc::clone(&fetch), kind, parent.take()).expect("cache");
        parent = Some(Box::new(cache));
    }
    *parent.expect("at least one level")
}

pub fn info(cache_size: u32, tile_size: u32) -> GridCacheInfo {
    GridCacheInfo {
        cache_size,
        tile_size,
        ..Default::default()
    }
}

/// Call `step` until `done` holds or five seconds pass.
pub fn pump<T>(target: &mut T, mut step: impl FnMut(&mut T), done: impl Fn(&T) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        step(target);
        if done(target) {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
