//! Address pool
//!
//! Splits the target's physical region map into page-sized units once, at
//! startup, and hands out random samples of them. The pool is immutable
//! after `build`, so it is shared between workers by `Arc` with no locking.

use crate::error::{StressError, Result};
use crate::types::{AddressableUnit, RegionMap, PAGE_SIZE, REGION_MAP_VERSION};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Shuffled list of every addressable unit of the target
#[derive(Debug, Clone)]
pub struct AddressPool {
    units: Vec<AddressableUnit>,
}

impl AddressPool {
    /// Carve `map` into units and shuffle them.
    ///
    /// A region yields units only while more than one full page remains, so
    /// it contributes `ceil(length / PAGE_SIZE) - 1` units and a region of
    /// exactly one page contributes none.
    pub fn build<R: Rng + ?Sized>(map: &RegionMap, rng: &mut R) -> Result<Self> {
        if map.version != REGION_MAP_VERSION {
            return Err(StressError::RegionMapVersion {
                expected: REGION_MAP_VERSION,
                found: map.version,
            });
        }

        let mut sorted = map.regions.clone();
        sorted.sort_by_key(|r| r.base);
        for pair in sorted.windows(2) {
            if pair[0].end() > pair[1].base {
                return Err(StressError::RegionMap(format!(
                    "regions at {:#x} and {:#x} overlap",
                    pair[0].base, pair[1].base
                )));
            }
        }

        let mut units = Vec::new();
        for region in &map.regions {
            if region.base % PAGE_SIZE != 0 {
                return Err(StressError::RegionMap(format!(
                    "region base {:#x} is not page-aligned",
                    region.base
                )));
            }

            let mut base = region.base;
            let mut remaining = region.length;
            while remaining > PAGE_SIZE {
                units.push(AddressableUnit {
                    base,
                    remaining_bytes_in_region: remaining,
                });
                base += PAGE_SIZE;
                remaining -= PAGE_SIZE;
            }
        }

        if units.is_empty() {
            return Err(StressError::EmptyPool);
        }

        units.shuffle(rng);
        debug!(
            units = units.len(),
            regions = map.regions.len(),
            "Address pool built"
        );

        Ok(Self { units })
    }

    /// Draw `n` units uniformly, with replacement
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<AddressableUnit> {
        (0..n).map(|_| self.random_unit(rng)).collect()
    }

    /// Draw one unit uniformly
    pub fn random_unit<R: Rng + ?Sized>(&self, rng: &mut R) -> AddressableUnit {
        self.units[rng.gen_range(0..self.units.len())]
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Every unit, in shuffled order
    pub fn units(&self) -> &[AddressableUnit] {
        &self.units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhysicalRegion;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x5eed)
    }

    fn pool_of(regions: Vec<PhysicalRegion>) -> Result<AddressPool> {
        AddressPool::build(&RegionMap::new(regions), &mut rng())
    }

    #[test]
    fn test_one_page_region_contributes_nothing() {
        let result = pool_of(vec![PhysicalRegion::new(0x1000, PAGE_SIZE)]);
        assert!(matches!(result, Err(StressError::EmptyPool)));
    }

    #[test]
    fn test_region_unit_counts() {
        // {8192, 4096, 20480} -> {1, 0, 4}
        let pool = pool_of(vec![
            PhysicalRegion::new(0x1000, 8192),
            PhysicalRegion::new(0x10_0000, 4096),
            PhysicalRegion::new(0x20_0000, 20480),
        ])
        .unwrap();
        assert_eq!(pool.len(), 5);

        let bases: HashSet<u64> = pool.units().iter().map(|u| u.base).collect();
        assert_eq!(bases.len(), 5);
        assert!(bases.iter().all(|b| b % PAGE_SIZE == 0));

        let first: Vec<_> = pool.units().iter().filter(|u| u.base < 0x10_0000).collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].base, 0x1000);
        assert_eq!(first[0].remaining_bytes_in_region, 8192);

        let third = pool.units().iter().filter(|u| u.base >= 0x20_0000).count();
        assert_eq!(third, 4);
    }

    #[test]
    fn test_trailing_partial_page() {
        // 2 pages + 1 byte: remaining 8193 and 4097 both exceed a page.
        let pool = pool_of(vec![PhysicalRegion::new(0, PAGE_SIZE * 2 + 1)]).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let map = RegionMap {
            version: REGION_MAP_VERSION + 1,
            regions: vec![PhysicalRegion::new(0, 0x10000)],
        };
        let result = AddressPool::build(&map, &mut rng());
        assert!(matches!(
            result,
            Err(StressError::RegionMapVersion { .. })
        ));
    }

    #[test]
    fn test_unaligned_region_rejected() {
        let result = pool_of(vec![PhysicalRegion::new(0x1001, 0x10000)]);
        assert!(matches!(result, Err(StressError::RegionMap(_))));
    }

    #[test]
    fn test_overlapping_regions_rejected() {
        let result = pool_of(vec![
            PhysicalRegion::new(0x0, 0x4000),
            PhysicalRegion::new(0x2000, 0x4000),
        ]);
        assert!(matches!(result, Err(StressError::RegionMap(_))));
    }

    #[test]
    fn test_sample_is_reproducible_with_replacement() {
        let pool = pool_of(vec![PhysicalRegion::new(0, PAGE_SIZE * 4)]).unwrap();
        assert_eq!(pool.len(), 3);

        let a = pool.sample(&mut StdRng::seed_from_u64(9), 64);
        let b = pool.sample(&mut StdRng::seed_from_u64(9), 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        // 64 draws from 3 units must repeat.
        let distinct: HashSet<u64> = a.iter().map(|u| u.base).collect();
        assert!(distinct.len() <= 3);
    }

    #[test]
    fn test_shuffle_depends_on_rng() {
        let map = RegionMap::new(vec![PhysicalRegion::new(0, PAGE_SIZE * 65)]);
        let a = AddressPool::build(&map, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = AddressPool::build(&map, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(a.units(), b.units());
    }
}
