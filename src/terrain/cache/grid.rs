use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::fetch::{fetch_guarded, ColorFetch, HeightFetch, TileFetch};
use super::loader::TileLoader;
use crate::terrain::double_buffer::DoubleBufferedList;
use crate::terrain::error::{Error, Result};
use crate::terrain::heightmap::{is_valid_height, INVALID_HEIGHT};
use crate::terrain::texel::Rgba8;
use crate::terrain::tile::{wrap, Region, Tile};
use crate::utils::timer::Timer;

pub type TerrainGridCache = GridCache<HeightFetch>;
pub type TextureGridCache = GridCache<ColorFetch>;

/// How a cache obtains its tiles.
#[derive(Clone)]
pub enum CacheKind {
    /// Tiles are fetched on the calling thread as soon as they enter the
    /// window. Used for the coarsest level, which has no parent to fall back
    /// on.
    Resident,
    /// Tiles are fetched by loader workers and merged on the next update.
    Streaming(Arc<TileLoader>),
}

#[derive(Clone, Copy, Debug)]
pub struct GridCacheInfo {
    pub level: u32,
    /// Tiles per cache edge.
    pub cache_size: u32,
    /// Samples per tile edge.
    pub tile_size: u32,
    /// Attempts after the first failed load before a tile is left empty.
    pub max_retries: u32,
    /// Update cycles to wait before retrying a failed load.
    pub retry_delay_cycles: u64,
}

impl Default for GridCacheInfo {
    fn default() -> Self {
        Self {
            level: 0,
            cache_size: 5,
            tile_size: 32,
            max_retries: 3,
            retry_delay_cycles: 30,
        }
    }
}

/// Square block of tiles resident around the current position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileWindow {
    pub min: Tile,
    pub size: u32,
}

impl TileWindow {
    pub fn centered(center: Tile, size: u32) -> Self {
        let half = (size / 2) as i32;
        Self {
            min: Tile::new(center.x - half, center.y - half),
            size,
        }
    }

    pub fn center(&self) -> Tile {
        let half = (self.size / 2) as i32;
        Tile::new(self.min.x + half, self.min.y + half)
    }

    pub fn contains(&self, tile: Tile) -> bool {
        let size = self.size as i32;
        tile.x >= self.min.x
            && tile.y >= self.min.y
            && tile.x < self.min.x + size
            && tile.y < self.min.y + size
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> {
        let TileWindow { min, size } = *self;
        let size = size as i32;
        (0..size).flat_map(move |y| (0..size).map(move |x| Tile::new(min.x + x, min.y + y)))
    }
}

/// Observable state of one tile slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TileState {
    Empty,
    Requested,
    Loaded,
    /// Loaded data stays readable while a newer copy is in flight.
    Refreshing,
    /// The source has no data for this tile.
    Missing,
}

enum SlotState<P> {
    Empty,
    Requested { ticket: u64, stale: bool },
    Loaded(P),
    Refreshing { data: P, ticket: u64, stale: bool },
    Missing,
}

impl<P> SlotState<P> {
    fn ticket(&self) -> Option<u64> {
        match self {
            SlotState::Requested { ticket, .. } | SlotState::Refreshing { ticket, .. } => {
                Some(*ticket)
            }
            _ => None,
        }
    }

    fn data(&self) -> Option<&P> {
        match self {
            SlotState::Loaded(data) | SlotState::Refreshing { data, .. } => Some(data),
            _ => None,
        }
    }

    fn observe(&self) -> TileState {
        match self {
            SlotState::Empty => TileState::Empty,
            SlotState::Requested { .. } => TileState::Requested,
            SlotState::Loaded(_) => TileState::Loaded,
            SlotState::Refreshing { .. } => TileState::Refreshing,
            SlotState::Missing => TileState::Missing,
        }
    }
}

struct Slot<P> {
    tile: Option<Tile>,
    state: SlotState<P>,
}

impl<P> Slot<P> {
    fn empty() -> Self {
        Self {
            tile: None,
            state: SlotState::Empty,
        }
    }
}

/// Outcome of one tile request, posted by the loader.
pub struct TileResult<P> {
    pub tile: Tile,
    pub ticket: u64,
    pub outcome: Result<P>,
}

// Two results are the same delivery when they answer the same request.
impl<P> PartialEq for TileResult<P> {
    fn eq(&self, other: &Self) -> bool {
        self.tile == other.tile && self.ticket == other.ticket
    }
}

#[derive(Clone, Copy, Debug)]
struct RetryState {
    attempts: u32,
    due_cycle: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub level: u32,
    /// Slots holding readable data.
    pub resident: usize,
    /// Slots waiting on the source, refreshes included.
    pub pending: usize,
    pub missing: usize,
    pub requests_issued: u64,
    pub loads_completed: u64,
    pub failures: u64,
    /// Completions dropped because their tile had left the window.
    pub discarded: u64,
}

/// One clip level: a toroidal grid of tiles around the current position.
///
/// Each cache owns its coarser parent, so the finest cache is the handle to
/// the whole chain. Reads that miss fall through to the parent.
pub struct GridCache<F: TileFetch> {
    info: GridCacheInfo,
    fetch: Arc<F>,
    kind: CacheKind,
    parent: Option<Box<GridCache<F>>>,
    slots: Vec<Slot<F::Payload>>,
    window: Option<TileWindow>,
    completed: Arc<DoubleBufferedList<TileResult<F::Payload>>>,
    front: Vec<TileResult<F::Payload>>,
    // Tickets the source is still working on. Outlives eviction so a tile
    // that comes back picks up its pending request instead of sending another.
    in_flight: HashMap<Tile, u64>,
    retries: HashMap<Tile, RetryState>,
    regions: Option<Arc<DoubleBufferedList<Region>>>,
    next_ticket: u64,
    cycle: u64,
    stats: CacheStats,
}

impl<F: TileFetch> GridCache<F> {
    pub fn new(
        info: GridCacheInfo,
        fetch: Arc<F>,
        kind: CacheKind,
        parent: Option<Box<GridCache<F>>>,
    ) -> Result<Self> {
        if info.tile_size == 0 {
            return Err(Error::configuration("tile_size", "must be positive"));
        }
        if info.cache_size == 0 {
            return Err(Error::configuration("cache_size", "must be positive"));
        }
        if let Some(parent) = &parent {
            if parent.level() != info.level + 1 {
                return Err(Error::configuration(
                    "level",
                    format!(
                        "parent of level {} must be level {}, got {}",
                        info.level,
                        info.level + 1,
                        parent.level()
                    ),
                ));
            }
        }

        let slot_count = info.cache_size as usize * info.cache_size as usize;
        Ok(Self {
            info,
            fetch,
            kind,
            parent,
            slots: (0..slot_count).map(|_| Slot::empty()).collect(),
            window: None,
            completed: Arc::new(DoubleBufferedList::new()),
            front: Vec::new(),
            in_flight: HashMap::new(),
            retries: HashMap::new(),
            regions: None,
            next_ticket: 0,
            cycle: 0,
            stats: CacheStats {
                level: info.level,
                ..Default::default()
            },
        })
    }

    pub fn level(&self) -> u32 {
        self.info.level
    }

    pub fn info(&self) -> &GridCacheInfo {
        &self.info
    }

    pub fn tile_size(&self) -> u32 {
        self.info.tile_size
    }

    pub fn cache_size(&self) -> u32 {
        self.info.cache_size
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.kind, CacheKind::Streaming(_))
    }

    pub fn parent(&self) -> Option<&GridCache<F>> {
        self.parent.as_deref()
    }

    pub fn window(&self) -> Option<TileWindow> {
        self.window
    }

    /// This cache and every coarser one, finest first.
    pub fn levels(&self) -> Levels<'_, F> {
        Levels { next: Some(self) }
    }

    /// The cache for clip `level` in this chain.
    pub fn level_cache(&self, level: u32) -> Option<&GridCache<F>> {
        self.levels().find(|cache| cache.level() == level)
    }

    /// Send a [`Region`] for every merged tile of this level and its parents.
    pub fn set_region_mailbox(&mut self, mailbox: Arc<DoubleBufferedList<Region>>) {
        if let Some(parent) = self.parent.as_deref_mut() {
            parent.set_region_mailbox(Arc::clone(&mailbox));
        }
        self.regions = Some(mailbox);
    }

    /// Per-frame entry point for the whole chain.
    ///
    /// Coarser levels are updated first so their data is in place before the
    /// finer levels start falling back on it. `(x, z)` are sample coordinates
    /// of this level.
    pub fn update(&mut self, x: i32, z: i32) {
        if let Some(parent) = self.parent.as_deref_mut() {
            parent.update(x.div_euclid(2), z.div_euclid(2));
        }
        self.cycle += 1;
        self.merge_completed();
        self.apply_invalidations();
        self.process_retries();
        self.set_current_position(x, z);
    }

    /// Move the window so it is centred on the tile covering `(x, z)`.
    ///
    /// Only tiles in the symmetric difference of the old and new windows are
    /// touched: tiles that left are evicted, tiles that entered are requested.
    pub fn set_current_position(&mut self, x: i32, z: i32) {
        let center = Tile::containing(x, z, self.info.tile_size);
        let window = TileWindow::centered(center, self.info.cache_size);
        if self.window == Some(window) {
            return;
        }

        let old = self.window.replace(window);
        if let Some(old) = old {
            for tile in old.tiles().filter(|tile| !window.contains(*tile)) {
                self.evict(tile);
            }
        }

        let mut entering: Vec<Tile> = window
            .tiles()
            .filter(|tile| old.map_or(true, |old| !old.contains(*tile)))
            .collect();
        // Nearest tiles first.
        entering.sort_by_key(|tile| (tile.x - center.x).abs().max((tile.y - center.y).abs()));

        trace!(
            "{} level {} moved to tile ({}, {}), requesting {} tile(s)",
            self.fetch.kind(),
            self.info.level,
            center.x,
            center.y,
            entering.len()
        );
        for tile in entering {
            self.request(tile);
        }
    }

    pub fn tile_state(&self, tile: Tile) -> TileState {
        let slot = &self.slots[self.slot_index(tile)];
        if slot.tile == Some(tile) {
            slot.state.observe()
        } else {
            TileState::Empty
        }
    }

    /// Whether the tile under the window centre has data.
    pub fn is_ready(&self) -> bool {
        self.window
            .is_some_and(|window| self.resident(window.center()).is_some())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        for slot in &self.slots {
            match slot.state {
                SlotState::Empty => {}
                SlotState::Requested { .. } => stats.pending += 1,
                SlotState::Loaded(_) => stats.resident += 1,
                SlotState::Refreshing { .. } => {
                    stats.resident += 1;
                    stats.pending += 1;
                }
                SlotState::Missing => stats.missing += 1,
            }
        }
        stats
    }

    fn slot_index(&self, tile: Tile) -> usize {
        let size = self.info.cache_size as i32;
        (wrap(tile.y, size) * size + wrap(tile.x, size)) as usize
    }

    fn resident(&self, tile: Tile) -> Option<&F::Payload> {
        let slot = &self.slots[self.slot_index(tile)];
        if slot.tile != Some(tile) {
            return None;
        }
        slot.state.data()
    }

    fn evict(&mut self, tile: Tile) {
        let index = self.slot_index(tile);
        if self.slots[index].tile == Some(tile) {
            self.slots[index] = Slot::empty();
            if let Some(regions) = &self.regions {
                regions.remove(&Region::of_tile(self.info.level, tile, self.info.tile_size));
            }
        }
        self.retries.remove(&tile);
    }

    fn request(&mut self, tile: Tile) {
        let index = self.slot_index(tile);
        let (ticket, submit) = match self.in_flight.get(&tile) {
            Some(&ticket) => (ticket, false),
            None => (self.take_ticket(), true),
        };
        self.slots[index] = Slot {
            tile: Some(tile),
            state: SlotState::Requested {
                ticket,
                stale: false,
            },
        };
        if submit {
            self.submit(tile, ticket);
        }
    }

    /// Ask the source again for a tile already in the window.
    ///
    /// Loaded data stays readable while the new copy is in flight. A tile
    /// with a request outstanding is only flagged, so there is never more
    /// than one request per tile.
    fn reload(&mut self, tile: Tile) {
        let index = self.slot_index(tile);
        if self.slots[index].tile != Some(tile) {
            return;
        }

        let state = std::mem::replace(&mut self.slots[index].state, SlotState::Empty);
        let (state, submit) = match state {
            SlotState::Requested { ticket, .. } => (SlotState::Requested { ticket, stale: true }, None),
            SlotState::Refreshing { data, ticket, .. } => (
                SlotState::Refreshing {
                    data,
                    ticket,
                    stale: true,
                },
                None,
            ),
            SlotState::Loaded(data) => {
                let ticket = self.take_ticket();
                (
                    SlotState::Refreshing {
                        data,
                        ticket,
                        stale: false,
                    },
                    Some(ticket),
                )
            }
            SlotState::Empty | SlotState::Missing => {
                let ticket = self.take_ticket();
                (
                    SlotState::Requested {
                        ticket,
                        stale: false,
                    },
                    Some(ticket),
                )
            }
        };
        self.slots[index].state = state;
        if let Some(ticket) = submit {
            self.submit(tile, ticket);
        }
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.stats.requests_issued += 1;
        self.next_ticket
    }

    fn submit(&mut self, tile: Tile, ticket: u64) {
        self.in_flight.insert(tile, ticket);
        let level = self.info.level;
        let loader = match &self.kind {
            CacheKind::Resident => None,
            CacheKind::Streaming(loader) => Some(Arc::clone(loader)),
        };
        match loader {
            None => {
                let outcome = fetch_guarded(self.fetch.as_ref(), level, tile);
                self.complete(TileResult {
                    tile,
                    ticket,
                    outcome,
                });
            }
            Some(loader) => {
                let fetch = Arc::clone(&self.fetch);
                let completed = Arc::clone(&self.completed);
                loader.submit(Box::new(move || {
                    let timer = Timer::started();
                    let outcome = fetch_guarded(fetch.as_ref(), level, tile);
                    debug!(
                        "{} level {} tile ({}, {}) fetched in {}us",
                        fetch.kind(),
                        level,
                        tile.x,
                        tile.y,
                        timer.elapsed_micro()
                    );
                    completed.add(TileResult {
                        tile,
                        ticket,
                        outcome,
                    });
                }));
            }
        }
    }

    /// Drain the loader mailbox into the grid. Runs on the update thread only.
    fn merge_completed(&mut self) {
        let mut front = std::mem::take(&mut self.front);
        self.completed.switch_into(&mut front);
        for result in front.drain(..) {
            self.complete(result);
        }
        self.front = front;
    }

    fn complete(&mut self, result: TileResult<F::Payload>) {
        let TileResult {
            tile,
            ticket,
            outcome,
        } = result;
        if self.in_flight.get(&tile) == Some(&ticket) {
            self.in_flight.remove(&tile);
        }
        let index = self.slot_index(tile);
        let slot = &mut self.slots[index];
        if slot.tile != Some(tile) || slot.state.ticket() != Some(ticket) {
            self.stats.discarded += 1;
            trace!(
                "{} level {} dropped late tile ({}, {})",
                self.fetch.kind(),
                self.info.level,
                tile.x,
                tile.y
            );
            return;
        }

        let previous = std::mem::replace(&mut slot.state, SlotState::Empty);
        let stale = matches!(
            previous,
            SlotState::Requested { stale: true, .. } | SlotState::Refreshing { stale: true, .. }
        );
        let old_data = match previous {
            SlotState::Refreshing { data, .. } => Some(data),
            _ => None,
        };

        match outcome {
            Ok(data) => {
                slot.state = SlotState::Loaded(data);
                self.stats.loads_completed += 1;
                self.retries.remove(&tile);
                if let Some(regions) = &self.regions {
                    regions.add(Region::of_tile(self.info.level, tile, self.info.tile_size));
                }
                if stale {
                    self.reload(tile);
                }
            }
            Err(err) if err.is_retryable() => {
                self.stats.failures += 1;
                slot.state = match old_data {
                    Some(data) => SlotState::Loaded(data),
                    None => SlotState::Empty,
                };
                self.schedule_retry(tile, &err);
            }
            Err(err) => {
                debug!("{} level {}: {}", self.fetch.kind(), self.info.level, err);
                slot.state = SlotState::Missing;
                self.retries.remove(&tile);
            }
        }
    }

    fn schedule_retry(&mut self, tile: Tile, err: &Error) {
        let attempts = self.retries.get(&tile).map_or(0, |retry| retry.attempts) + 1;
        if attempts > self.info.max_retries {
            warn!(
                "{} level {}: giving up on tile ({}, {}) after {} attempt(s): {}",
                self.fetch.kind(),
                self.info.level,
                tile.x,
                tile.y,
                attempts,
                err
            );
            self.retries.remove(&tile);
            return;
        }
        warn!(
            "{} level {}: {} (retry {} of {})",
            self.fetch.kind(),
            self.info.level,
            err,
            attempts,
            self.info.max_retries
        );
        self.retries.insert(
            tile,
            RetryState {
                attempts,
                due_cycle: self.cycle + self.info.retry_delay_cycles,
            },
        );
    }

    fn process_retries(&mut self) {
        let cycle = self.cycle;
        let due: Vec<Tile> = self
            .retries
            .iter()
            .filter(|(_, retry)| retry.due_cycle <= cycle)
            .map(|(tile, _)| *tile)
            .collect();

        for tile in due {
            if !self.window.is_some_and(|window| window.contains(tile)) {
                self.retries.remove(&tile);
                continue;
            }
            if let Some(retry) = self.retries.get_mut(&tile) {
                // Rescheduled by `schedule_retry` if this attempt fails too.
                retry.due_cycle = u64::MAX;
            }
            self.reload(tile);
        }
    }

    fn apply_invalidations(&mut self) {
        let Some(window) = self.window else {
            return;
        };
        for tile in self.fetch.invalid_tiles(self.info.level) {
            if window.contains(tile) {
                self.retries.remove(&tile);
                self.reload(tile);
            }
        }
    }
}

pub struct Levels<'a, F: TileFetch> {
    next: Option<&'a GridCache<F>>,
}

impl<'a, F: TileFetch> Iterator for Levels<'a, F> {
    type Item = &'a GridCache<F>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

impl GridCache<HeightFetch> {
    /// Height at `(x, z)` if this level holds it.
    pub fn resident_height(&self, x: i32, z: i32) -> Option<f32> {
        let tile_size = self.info.tile_size;
        let tile = Tile::containing(x, z, tile_size);
        let data = self.resident(tile)?;
        let (ox, oz) = tile.origin(tile_size);
        let index = (z - oz) as usize * tile_size as usize + (x - ox) as usize;
        let height = data[index];
        is_valid_height(height).then_some(height)
    }

    /// Height at `(x, z)` from this level, or the nearest coarser level that
    /// has it.
    pub fn height(&self, x: i32, z: i32) -> Option<f32> {
        self.resident_height(x, z)
            .or_else(|| self.parent()?.height(x.div_euclid(2), z.div_euclid(2)))
    }

    /// Bilinear height at fractional sample coordinates with the same
    /// fallback as [`GridCache::height`].
    pub fn sub_height(&self, x: f32, z: f32) -> Option<f32> {
        let (x0, z0) = (x.floor(), z.floor());
        let (fx, fz) = (x - x0, z - z0);
        let (ix, iz) = (x0 as i32, z0 as i32);
        let (nx, nz) = (ix.saturating_add(1), iz.saturating_add(1));
        let corners = [
            self.resident_height(ix, iz),
            self.resident_height(nx, iz),
            self.resident_height(ix, nz),
            self.resident_height(nx, nz),
        ];
        if let [Some(h00), Some(h10), Some(h01), Some(h11)] = corners {
            let top = h00 + (h10 - h00) * fx;
            let bottom = h01 + (h11 - h01) * fx;
            return Some(top + (bottom - top) * fz);
        }
        self.parent()?.sub_height(x * 0.5, z * 0.5)
    }

    /// Fill `dest` with a `width x height` block starting at `(x, z)`.
    ///
    /// Samples nobody holds are written as [`INVALID_HEIGHT`]. Returns how
    /// many samples came from this level rather than a parent.
    pub fn copy_heights(&self, x: i32, z: i32, width: u32, height: u32, dest: &mut [f32]) -> usize {
        let mut own = 0;
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                let index = row as usize * width as usize + col as usize;
                let Some(target) = dest.get_mut(index) else {
                    return own;
                };
                *target = match self.resident_height(x + col, z + row) {
                    Some(h) => {
                        own += 1;
                        h
                    }
                    None => self
                        .parent()
                        .and_then(|parent| {
                            parent.height((x + col).div_euclid(2), (z + row).div_euclid(2))
                        })
                        .unwrap_or(INVALID_HEIGHT),
                };
            }
        }
        own
    }
}

impl GridCache<ColorFetch> {
    pub fn resident_color(&self, x: i32, z: i32) -> Option<Rgba8> {
        let tile_size = self.info.tile_size;
        let tile = Tile::containing(x, z, tile_size);
        let data = self.resident(tile)?;
        let (ox, oz) = tile.origin(tile_size);
        let format = self.fetch.format();
        let bytes = format.bytes_per_texel();
        let offset = ((z - oz) as usize * tile_size as usize + (x - ox) as usize) * bytes;
        data.get(offset..offset + bytes)
            .map(|texel| Rgba8::from_texel(format, texel))
    }

    /// Colour at `(x, z)` with fallback to coarser levels.
    pub fn color(&self, x: i32, z: i32) -> Option<Rgba8> {
        self.resident_color(x, z)
            .or_else(|| self.parent()?.color(x.div_euclid(2), z.div_euclid(2)))
    }

    /// RGBA8 bytes of a `width x height` block starting at `(x, z)`.
    ///
    /// Texels nobody holds are transparent black.
    pub fn copy_texels(&self, x: i32, z: i32, width: u32, height: u32) -> Vec<u8> {
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                texels.push(self.color(x + col, z + row).unwrap_or_default());
            }
        }
        bytemuck::cast_slice(&texels).to_vec()
    }
}
