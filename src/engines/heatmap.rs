// Heatmap Engine - price-bucketed book depth with lossy compression
// Cells below a fraction of the largest cell are dropped from the output

use std::collections::{BTreeMap, HashMap};

use crate::core::config::HeatmapConfig;
use crate::core::error::{EngineResult, ValidationError};
use crate::core::types::{
    BookSide, BookSnapshot, EngineSource, HeatmapResult, HeatmapTile, IndicatorKind,
    IndicatorResult, IndicatorValue, Level,
};
use crate::core::utils::{bucket_price, bucket_start, quantize_index};
use crate::engines::{rejected, IndicatorEngine};
use crate::state::{LockedStore, ShardedStore, SymbolStore};

/// (price bucket index, side)
pub type CellKey = (i64, BookSide);

/// Group non-empty levels by cell, keeping book order inside each cell.
fn group_levels(
    snapshot: &BookSnapshot,
    bucket_width: f64,
) -> Result<BTreeMap<CellKey, Vec<Level>>, ValidationError> {
    let mut cells: BTreeMap<CellKey, Vec<Level>> = BTreeMap::new();
    for (side, level) in snapshot.levels() {
        if level.size <= 0.0 {
            continue;
        }
        let bucket = quantize_index(level.price, bucket_width)?;
        cells.entry((bucket, side)).or_default().push(*level);
    }
    Ok(cells)
}

fn cell_sum(levels: &[Level]) -> f64 {
    levels.iter().fold(0.0, |acc, l| acc + l.size)
}

fn same_levels(a: &[Level], b: &[Level]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.price.to_bits() == y.price.to_bits() && x.size.to_bits() == y.size.to_bits()
        })
}

/// Build the result from cell sums already ordered by (bucket, side).
fn assemble(ts: i64, config: &HeatmapConfig, cells: &[(CellKey, f64)], reused: usize) -> HeatmapResult {
    let max_size = cells.iter().fold(0.0_f64, |m, (_, size)| m.max(*size));
    let cutoff = config.significance_threshold * max_size;

    let tiles: Vec<HeatmapTile> = cells
        .iter()
        .filter(|(_, size)| *size > 0.0 && *size >= cutoff)
        .map(|&((bucket, side), size)| HeatmapTile {
            bucket,
            price: bucket_price(bucket, config.bucket_width),
            side,
            size,
            significant: true,
        })
        .collect();

    let total_buckets = cells.len();
    let compression_ratio = if total_buckets == 0 {
        0.0
    } else {
        tiles.len() as f64 / total_buckets as f64
    };

    HeatmapResult {
        bucket_ts: bucket_start(ts, config.bucket_ms),
        bucket_ms: config.bucket_ms,
        tiles,
        max_size,
        total_buckets,
        compression_ratio,
        reused_buckets: reused,
    }
}

fn full_from(grouped: BTreeMap<CellKey, Vec<Level>>, ts: i64, config: &HeatmapConfig) -> HeatmapResult {
    let cells: Vec<(CellKey, f64)> = grouped
        .into_iter()
        .map(|(key, levels)| (key, cell_sum(&levels)))
        .collect();
    assemble(ts, config, &cells, 0)
}

/// Full recomputation from a single snapshot.
pub fn compute_full(snapshot: &BookSnapshot, config: &HeatmapConfig) -> Result<HeatmapResult, ValidationError> {
    let grouped = group_levels(snapshot, config.bucket_width)?;
    Ok(full_from(grouped, snapshot.ts, config))
}

#[derive(Debug, Clone)]
struct CellMemo {
    levels: Vec<Level>,
    sum: f64,
}

/// Per-symbol cache of the previous snapshot's cells
#[derive(Debug, Clone, Default)]
pub struct HeatmapState {
    cells: HashMap<CellKey, CellMemo>,
    snapshots: u64,
}

impl HeatmapState {
    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// Incremental update. A cell's sum is reused only when its contributing
    /// levels match the previous snapshot bit for bit, so the output equals
    /// [`compute_full`] exactly. State is untouched on error.
    pub fn apply_incremental(
        &mut self,
        snapshot: &BookSnapshot,
        config: &HeatmapConfig,
    ) -> Result<HeatmapResult, ValidationError> {
        let grouped = group_levels(snapshot, config.bucket_width)?;
        Ok(self.incremental_from(grouped, snapshot.ts, config))
    }

    pub fn apply_full(
        &mut self,
        snapshot: &BookSnapshot,
        config: &HeatmapConfig,
    ) -> Result<HeatmapResult, ValidationError> {
        let grouped = group_levels(snapshot, config.bucket_width)?;
        self.snapshots += 1;
        Ok(full_from(grouped, snapshot.ts, config))
    }

    fn incremental_from(
        &mut self,
        grouped: BTreeMap<CellKey, Vec<Level>>,
        ts: i64,
        config: &HeatmapConfig,
    ) -> HeatmapResult {
        let mut next = HashMap::with_capacity(grouped.len());
        let mut cells = Vec::with_capacity(grouped.len());
        let mut reused = 0;

        for (key, levels) in grouped {
            let sum = match self.cells.get(&key) {
                Some(memo) if same_levels(&memo.levels, &levels) => {
                    reused += 1;
                    memo.sum
                }
                _ => cell_sum(&levels),
            };
            cells.push((key, sum));
            next.insert(key, CellMemo { levels, sum });
        }

        self.cells = next;
        self.snapshots += 1;
        assemble(ts, config, &cells, reused)
    }
}

/// Fast engines update incrementally, fallback engines recompute every snapshot.
pub struct HeatmapEngine<St> {
    config: HeatmapConfig,
    source: EngineSource,
    store: St,
}

impl HeatmapEngine<ShardedStore<HeatmapState>> {
    pub fn fast(config: HeatmapConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fast, ShardedStore::new("heatmap", max_symbols))
    }
}

impl HeatmapEngine<LockedStore<HeatmapState>> {
    pub fn fallback(config: HeatmapConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fallback, LockedStore::new("heatmap", max_symbols))
    }
}

impl<St: SymbolStore<HeatmapState>> HeatmapEngine<St> {
    pub fn with_store(config: HeatmapConfig, source: EngineSource, store: St) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    pub fn update(&self, snapshot: &BookSnapshot) -> EngineResult<HeatmapResult> {
        snapshot
            .validate()
            .map_err(|e| rejected(IndicatorKind::Heatmap, &snapshot.symbol, e))?;

        // Bucketing can still fail, so it runs before any state is created
        let grouped = group_levels(snapshot, self.config.bucket_width)
            .map_err(|e| rejected(IndicatorKind::Heatmap, &snapshot.symbol, e))?;

        let config = &self.config;
        let incremental = self.source == EngineSource::Fast;
        Ok(self.store.with_state(&snapshot.symbol, HeatmapState::default, |state| {
            if incremental {
                state.incremental_from(grouped, snapshot.ts, config)
            } else {
                state.snapshots += 1;
                full_from(grouped, snapshot.ts, config)
            }
        }))
    }

    pub fn snapshots_seen(&self, symbol: &str) -> u64 {
        self.store.read(symbol, HeatmapState::snapshots).unwrap_or(0)
    }
}

impl<St: SymbolStore<HeatmapState>> IndicatorEngine for HeatmapEngine<St> {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Heatmap
    }

    fn source(&self) -> EngineSource {
        self.source
    }

    fn on_snapshot(&self, snapshot: &BookSnapshot) -> EngineResult<IndicatorResult> {
        let result = self.update(snapshot)?;
        Ok(IndicatorResult::new(
            IndicatorKind::Heatmap,
            self.source,
            snapshot.symbol.clone(),
            snapshot.ts,
            IndicatorValue::Heatmap(result),
        ))
    }

    fn symbol_count(&self) -> usize {
        self.store.len()
    }

    fn reset_symbol(&self, symbol: &str) -> bool {
        self.store.remove(symbol)
    }

    fn reset_all(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: f64) -> HeatmapConfig {
        HeatmapConfig {
            bucket_width: width,
            bucket_ms: 1000,
            significance_threshold: 0.01,
        }
    }

    fn book(ts: i64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> BookSnapshot {
        BookSnapshot::new(
            ts,
            "BTCUSDT",
            bids.iter().map(|&(p, s)| Level::new(p, s)).collect(),
            asks.iter().map(|&(p, s)| Level::new(p, s)).collect(),
        )
    }

    #[test]
    fn test_threshold_and_compression_ratio() {
        // max cell = 100, cutoff = 1.0; the 0.5 cell is dropped
        let snapshot = book(1_234_567_890, &[(100.0, 100.0), (99.0, 0.5)], &[(101.0, 1.0), (102.0, 20.0)]);
        let result = compute_full(&snapshot, &config(1.0)).unwrap();

        assert_eq!(result.total_buckets, 4);
        assert_eq!(result.tiles.len(), 3);
        assert_eq!(result.compression_ratio, 0.75);
        assert_eq!(result.max_size, 100.0);
        assert_eq!(result.bucket_ts, 1_234_567_000);
        assert!(result.tiles.iter().all(|t| t.significant));
        let prices: Vec<f64> = result.tiles.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 102.0]);
    }

    #[test]
    fn test_empty_snapshot() {
        let result = compute_full(&book(5, &[], &[]), &config(1.0)).unwrap();
        assert!(result.tiles.is_empty());
        assert_eq!(result.compression_ratio, 0.0);
        assert_eq!(result.total_buckets, 0);
    }

    #[test]
    fn test_zero_size_levels_create_no_cell() {
        let result = compute_full(&book(5, &[(100.0, 0.0)], &[(101.0, 2.0)]), &config(1.0)).unwrap();
        assert_eq!(result.total_buckets, 1);
        assert_eq!(result.compression_ratio, 1.0);
    }

    #[test]
    fn test_levels_aggregate_per_bucket_and_side() {
        // 100.2 and 99.9 both round into bucket 100 on a width of 1.0
        let snapshot = book(5, &[(100.2, 1.0), (99.9, 2.0)], &[(100.4, 4.0)]);
        let result = compute_full(&snapshot, &config(1.0)).unwrap();

        assert_eq!(result.total_buckets, 2);
        assert_eq!(result.tiles[0].side, BookSide::Bid);
        assert_eq!(result.tiles[0].size, 3.0);
        assert_eq!(result.tiles[1].side, BookSide::Ask);
        assert_eq!(result.tiles[1].bucket, 100);
    }

    #[test]
    fn test_incremental_reuses_unchanged_cells() {
        let engine = HeatmapEngine::fast(config(1.0), 100);
        let first = book(1, &[(100.0, 1.0), (99.0, 2.0)], &[(101.0, 3.0)]);
        let second = book(2, &[(100.0, 1.0), (99.0, 5.0)], &[(101.0, 3.0)]);

        let r1 = engine.update(&first).unwrap();
        assert_eq!(r1.reused_buckets, 0);

        let r2 = engine.update(&second).unwrap();
        assert_eq!(r2.reused_buckets, 2);
        assert_eq!(r2, compute_full(&second, &config(1.0)).unwrap());
        assert_eq!(engine.snapshots_seen("BTCUSDT"), 2);
    }

    #[test]
    fn test_fast_equals_fallback() {
        let fast = HeatmapEngine::fast(config(0.5), 100);
        let fallback = HeatmapEngine::fallback(config(0.5), 100);
        let books = [
            book(1, &[(100.1, 1.3), (99.7, 0.2)], &[(100.6, 7.0)]),
            book(2, &[(100.1, 1.3), (99.7, 0.2)], &[(100.6, 7.0), (101.2, 0.01)]),
            book(3, &[], &[(100.6, 7.0)]),
        ];
        for snapshot in &books {
            assert_eq!(fast.update(snapshot).unwrap(), fallback.update(snapshot).unwrap());
        }
    }

    #[test]
    fn test_one_dominant_bucket() {
        // cutoff = 0.01 * 1000 = 10, every other bucket is below it
        let snapshot = book(
            5,
            &[(100.0, 1000.0), (99.0, 9.5), (98.0, 3.0)],
            &[(101.0, 9.99), (102.0, 0.1)],
        );
        let result = compute_full(&snapshot, &config(1.0)).unwrap();

        assert_eq!(result.total_buckets, 5);
        assert_eq!(result.tiles.len(), 1);
        assert_eq!(result.tiles[0].price, 100.0);
        assert_eq!(result.tiles[0].size, 1000.0);
        assert_eq!(result.compression_ratio, 0.2);
    }

    #[test]
    fn test_price_out_of_bucket_range_rejected() {
        let wide = book(1, &[(1e17, 1.0)], &[]);
        assert!(matches!(
            compute_full(&wide, &config(0.01)),
            Err(ValidationError::PriceOutOfRange { .. })
        ));

        for engine in [
            Box::new(HeatmapEngine::fast(config(0.01), 10)) as Box<dyn IndicatorEngine>,
            Box::new(HeatmapEngine::fallback(config(0.01), 10)),
        ] {
            let err = engine.on_snapshot(&wide).unwrap_err();
            assert!(err.is_validation());
            assert_eq!(engine.symbol_count(), 0);
        }
    }

    #[test]
    fn test_invalid_snapshot_rejected() {
        let engine = HeatmapEngine::fallback(config(1.0), 100);
        assert!(engine.update(&book(1, &[(-1.0, 1.0)], &[])).is_err());
        assert_eq!(engine.symbol_count(), 0);
    }
}
