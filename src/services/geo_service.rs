use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::worker::GeoPoint;

/// Grid cell edge in degrees. ~28 km of latitude per cell, so a default
/// 25 km radius query touches a handful of cells instead of the whole set.
const CELL_SIZE_DEG: f64 = 0.25;

/// Kilometers per degree of latitude (and of longitude at the equator).
const KM_PER_DEG: f64 = 111.0;

type CellKey = (i32, i32);

#[derive(Default)]
struct Inner {
    positions: HashMap<Uuid, GeoPoint>,
    cells: HashMap<CellKey, Vec<Uuid>>,
}

/// Degree-grid spatial index over entity locations. Mutations take the write
/// lock, so the next query always observes them — there is no staleness
/// window inside the process.
pub struct GeoIndex {
    label: &'static str,
    inner: RwLock<Inner>,
}

impl GeoIndex {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn upsert(&self, id: Uuid, point: GeoPoint) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(old) = inner.positions.insert(id, point) {
            let old_key = cell_of(&old);
            let new_key = cell_of(&point);
            if old_key != new_key {
                detach(&mut inner.cells, old_key, id);
            } else {
                // Same bucket, membership unchanged.
                return Ok(());
            }
        }
        inner.cells.entry(cell_of(&point)).or_default().push(id);
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.positions.remove(&id) {
            Some(point) => {
                detach(&mut inner.cells, cell_of(&point), id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Entity ids within `radius_km` of `center`, ascending by distance,
    /// ties broken by id so identical inputs always rank identically.
    pub fn query(&self, center: GeoPoint, radius_km: f64) -> Result<Vec<(Uuid, f64)>> {
        let inner = self.read()?;
        if inner.positions.is_empty() || radius_km <= 0.0 {
            return Ok(Vec::new());
        }

        let lat_span = radius_km / KM_PER_DEG;
        // Longitude degrees shrink with latitude; clamp the cosine so polar
        // queries degrade to a wide scan instead of dividing by zero.
        let lon_span = radius_km / (KM_PER_DEG * center.latitude.to_radians().cos().max(0.01));

        let lat_min = ((center.latitude - lat_span) / CELL_SIZE_DEG).floor() as i32;
        let lat_max = ((center.latitude + lat_span) / CELL_SIZE_DEG).floor() as i32;
        let lon_min = ((center.longitude - lon_span) / CELL_SIZE_DEG).floor() as i32;
        let lon_max = ((center.longitude + lon_span) / CELL_SIZE_DEG).floor() as i32;

        let mut hits: Vec<(Uuid, f64)> = Vec::new();
        for lat_cell in lat_min..=lat_max {
            for lon_cell in lon_min..=lon_max {
                let Some(bucket) = inner.cells.get(&(lat_cell, lon_cell)) else {
                    continue;
                };
                for id in bucket {
                    let point = &inner.positions[id];
                    let d = center.distance_km(point);
                    if d <= radius_km {
                        hits.push((*id, d));
                    }
                }
            }
        }

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        debug!(
            index = self.label,
            hits = hits.len(),
            radius_km,
            "radius query"
        );
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.read().map(|i| i.positions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.positions.clear();
        inner.cells.clear();
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| Error::Transient {
            context: "geo index lock poisoned",
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| Error::Transient {
            context: "geo index lock poisoned",
        })
    }
}

fn cell_of(point: &GeoPoint) -> CellKey {
    (
        (point.latitude / CELL_SIZE_DEG).floor() as i32,
        (point.longitude / CELL_SIZE_DEG).floor() as i32,
    )
}

fn detach(cells: &mut HashMap<CellKey, Vec<Uuid>>, key: CellKey, id: Uuid) {
    if let Some(bucket) = cells.get_mut(&key) {
        bucket.retain(|entry| *entry != id);
        if bucket.is_empty() {
            cells.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn query_orders_by_distance_then_id() {
        let index = GeoIndex::new("workers");
        let center = GeoPoint::new(12.9716, 77.5946);
        index.upsert(id(3), GeoPoint::new(12.99, 77.60)).unwrap();
        index.upsert(id(1), GeoPoint::new(12.90, 77.55)).unwrap();
        // Two entities at the same point: id breaks the tie.
        index.upsert(id(9), GeoPoint::new(12.98, 77.61)).unwrap();
        index.upsert(id(5), GeoPoint::new(12.98, 77.61)).unwrap();

        let hits = index.query(center, 30.0).unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|(i, _)| *i).collect();
        // ~1.9 km pair first (id tie-break), then ~2.1 km, then ~9 km.
        assert_eq!(ids, vec![id(5), id(9), id(3), id(1)]);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn radius_filters_far_entities() {
        let index = GeoIndex::new("workers");
        let center = GeoPoint::new(12.9716, 77.5946);
        index.upsert(id(1), GeoPoint::new(12.98, 77.60)).unwrap();
        index.upsert(id(2), GeoPoint::new(13.50, 78.20)).unwrap(); // ~90 km away

        let hits = index.query(center, 10.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id(1));
    }

    #[test]
    fn upsert_moves_between_cells_and_remove_forgets() {
        let index = GeoIndex::new("jobs");
        let near = GeoPoint::new(12.97, 77.59);
        let far = GeoPoint::new(19.07, 72.88); // Mumbai
        index.upsert(id(1), near).unwrap();
        index.upsert(id(1), far).unwrap();

        assert!(index.query(near, 20.0).unwrap().is_empty());
        assert_eq!(index.query(far, 20.0).unwrap().len(), 1);

        assert!(index.remove(id(1)).unwrap());
        assert!(!index.remove(id(1)).unwrap());
        assert!(index.query(far, 20.0).unwrap().is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn query_spanning_many_cells_finds_everything() {
        let index = GeoIndex::new("workers");
        let center = GeoPoint::new(12.9716, 77.5946);
        for n in 0..40u128 {
            let lat = 12.5 + (n as f64) * 0.02;
            index.upsert(id(n + 1), GeoPoint::new(lat, 77.5946)).unwrap();
        }
        let wide = index.query(center, 60.0).unwrap();
        let narrow = index.query(center, 5.0).unwrap();
        assert!(wide.len() > narrow.len());
        assert_eq!(wide.len(), 40);
    }
}
