//! Point-in-polygon assignment.
//!
//! Polygons live in an R* tree keyed on their bounding boxes; a point is
//! only tested for exact containment against the polygons whose box holds
//! it. `geo::Contains` is strict: a point on a polygon's boundary is not
//! contained, so points exactly on a shared edge are dropped rather than
//! assigned twice.

use std::collections::BTreeMap;
use std::io::Read;

use geo::{BoundingRect, Contains, MultiPolygon};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::Result;
use crate::load::BatchReader;
use crate::model::{AddressPoint, ArealUnit, AssignedPoint};

struct PolygonEntry {
    code: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Envelope of a multipolygon, `None` when it has no coordinates.
pub fn envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

pub struct PolygonIndex {
    tree: RTree<PolygonEntry>,
}

impl PolygonIndex {
    pub fn new(units: Vec<ArealUnit>) -> Self {
        let total = units.len();
        let entries: Vec<_> = units
            .into_iter()
            .filter_map(|unit| {
                let envelope = envelope(&unit.geometry)?;
                Some(PolygonEntry {
                    code: unit.code,
                    envelope,
                    polygon: unit.geometry,
                })
            })
            .collect();
        if entries.len() < total {
            log::warn!("{} empty polygons left out of the index", total - entries.len());
        }
        PolygonIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Code of the polygon containing `(x, y)`.
    ///
    /// Polygons are assumed not to overlap, so the first match wins.
    pub fn lookup(&self, x: f64, y: f64) -> Option<&str> {
        let point = geo::Point::new(x, y);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .find(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.code.as_str())
    }

    /// Every polygon containing `(x, y)`; more than one means the input
    /// was not a partition.
    pub fn lookup_all(&self, x: f64, y: f64) -> Vec<&str> {
        let point = geo::Point::new(x, y);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.code.as_str())
            .collect()
    }
}

/// Counts for one pass of the filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub read: u64,
    pub assigned: u64,
    pub dropped: u64,
    pub malformed: u64,
}

impl FilterReport {
    pub fn log(&self, what: &str) {
        log::info!(
            "{what}: {} points read, {} assigned, {} outside every polygon, {} malformed rows skipped",
            self.read,
            self.assigned,
            self.dropped,
            self.malformed
        );
    }
}

/// Accumulates assigned points across batches.
#[derive(Debug, Default)]
pub struct Assignment {
    pub points: Vec<AssignedPoint>,
    pub report: FilterReport,
}

impl Assignment {
    /// Assign one batch and fold it in.
    pub fn push_batch(&mut self, index: &PolygonIndex, batch: Vec<AddressPoint>) {
        let read = batch.len() as u64;
        let assigned: Vec<_> = batch
            .into_par_iter()
            .filter_map(|p| {
                let code = index.lookup(p.x, p.y)?.to_string();
                Some(p.tagged(code))
            })
            .collect();

        self.report.read += read;
        self.report.assigned += assigned.len() as u64;
        self.report.dropped += read - assigned.len() as u64;
        self.points.extend(assigned);
    }
}

/// Assign every point in memory at once.
pub fn assign_points(index: &PolygonIndex, points: Vec<AddressPoint>) -> Assignment {
    let mut assignment = Assignment::default();
    assignment.push_batch(index, points);
    assignment
}

/// Assign points pulled from `next_batch` until it returns `None`.
///
/// Only one batch of unassigned points is held at a time.
pub fn assign_batched<F>(index: &PolygonIndex, mut next_batch: F) -> Assignment
where
    F: FnMut() -> Option<Vec<AddressPoint>>,
{
    let mut assignment = Assignment::default();
    while let Some(batch) = next_batch() {
        assignment.push_batch(index, batch);
        log::debug!("{} points assigned so far", assignment.report.assigned);
    }
    assignment
}

/// Keep the points that fall inside any polygon, indexing the polygons one
/// chunk at a time.
///
/// Each chunk gets its own pass over the points from `open_points`, read
/// `batch_size` rows at a time. A point kept by several chunks is kept once.
/// `read` and `malformed` come from the first pass; `assigned` is the size
/// of the union.
pub fn filter_in_chunks<R, C, O>(
    chunks: C,
    mut open_points: O,
    batch_size: usize,
) -> Result<(Vec<AddressPoint>, FilterReport)>
where
    R: Read,
    C: IntoIterator<Item = Result<Vec<ArealUnit>>>,
    O: FnMut() -> Result<BatchReader<R, AddressPoint>>,
{
    let mut kept = BTreeMap::new();
    let mut report = None;
    for (n, chunk) in chunks.into_iter().enumerate() {
        let index = PolygonIndex::new(chunk?);
        let mut reader = open_points()?;
        let mut assignment = assign_batched(&index, || reader.next_batch(batch_size));
        assignment.report.malformed = reader.malformed;
        log::info!(
            "chunk {}: {} polygons, {} points inside",
            n + 1,
            index.len(),
            assignment.report.assigned
        );
        for p in &assignment.points {
            kept.entry(p.uprn).or_insert_with(|| p.untagged());
        }
        report.get_or_insert(assignment.report);
    }

    let mut report = match report {
        Some(report) => report,
        None => {
            log::warn!("no polygons to filter against");
            let mut reader = open_points()?;
            let index = PolygonIndex::new(vec![]);
            let mut assignment = assign_batched(&index, || reader.next_batch(batch_size));
            assignment.report.malformed = reader.malformed;
            assignment.report
        }
    };
    report.assigned = kept.len() as u64;
    report.dropped = report.read - report.assigned;
    Ok((kept.into_values().collect(), report))
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::polygon;

    fn unit_square(code: &str, x0: f64, y0: f64) -> ArealUnit {
        ArealUnit::new(
            code,
            polygon![
                (x: x0, y: y0),
                (x: x0 + 1.0, y: y0),
                (x: x0 + 1.0, y: y0 + 1.0),
                (x: x0, y: y0 + 1.0),
                (x: x0, y: y0),
            ],
        )
    }

    fn point(uprn: u64, x: f64, y: f64) -> AddressPoint {
        AddressPoint { uprn, x, y }
    }

    fn grid(n: usize) -> Vec<ArealUnit> {
        let mut units = vec![];
        for i in 0..n {
            for j in 0..n {
                units.push(unit_square(&format!("{i}-{j}"), i as f64, j as f64));
            }
        }
        units
    }

    #[test]
    fn test_point_inside_one_square() {
        let index = PolygonIndex::new(grid(3));
        assert_eq!(index.lookup(1.5, 2.5), Some("1-2"));
        assert_eq!(index.lookup(5.0, 5.0), None);
    }

    #[test]
    fn test_no_point_assigned_twice() {
        let index = PolygonIndex::new(grid(4));
        // interior points, edges and corners of the grid
        for i in 0..=16 {
            for j in 0..=16 {
                let (x, y) = (i as f64 * 0.25, j as f64 * 0.25);
                assert!(index.lookup_all(x, y).len() <= 1, "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_boundary_points_are_dropped() {
        let index = PolygonIndex::new(vec![unit_square("a", 0.0, 0.0)]);
        assert_eq!(index.lookup(0.0, 0.5), None);
        assert_eq!(index.lookup(1.0, 1.0), None);
        assert_eq!(index.lookup(0.5, 0.5), Some("a"));
    }

    #[test]
    fn test_assign_points_tags_codes() {
        let index = PolygonIndex::new(grid(2));
        let assignment = assign_points(&index, vec![point(7, 1.25, 0.75), point(8, -1.0, 0.5)]);
        assert_eq!(assignment.report.dropped, 1);
        assert_eq!(assignment.points, vec![point(7, 1.25, 0.75).tagged("1-0".to_string())]);
    }

    #[test]
    fn test_batched_assignment_counts() {
        let index = PolygonIndex::new(grid(2));
        let mut batches = vec![
            vec![point(1, 0.5, 0.5), point(2, 9.0, 9.0)],
            vec![point(3, 1.5, 1.5)],
        ]
        .into_iter();

        let assignment = assign_batched(&index, || batches.next());

        assert_eq!(
            assignment.report,
            FilterReport {
                read: 3,
                assigned: 2,
                dropped: 1,
                malformed: 0
            }
        );
        let mut codes: Vec<_> = assignment
            .points
            .iter()
            .map(|p| (p.uprn, p.code.as_str()))
            .collect();
        codes.sort_unstable();
        assert_eq!(codes, [(1, "0-0"), (3, "1-1")]);
    }

    #[test]
    fn test_chunks_keep_each_point_once() {
        let csv = "UPRN,X_COORDINATE,Y_COORDINATE\n1,0.5,0.5\n2,0.75,0.5\n3,5.0,5.0\nx,1,1\n4,1.5,0.5\n";
        // the second chunk overlaps the first around point 2
        let chunks = vec![
            Ok(vec![unit_square("a", 0.0, 0.0)]),
            Ok(vec![unit_square("b", 0.6, 0.0), unit_square("c", 1.6, 0.0)]),
        ];

        let (kept, report) =
            filter_in_chunks(chunks, || Ok(BatchReader::new(csv.as_bytes())), 2).unwrap();

        assert_eq!(kept, [point(1, 0.5, 0.5), point(2, 0.75, 0.5), point(4, 1.5, 0.5)]);
        assert_eq!(
            report,
            FilterReport {
                read: 4,
                assigned: 3,
                dropped: 1,
                malformed: 1
            }
        );
    }

    #[test]
    fn test_no_chunks_drops_everything() {
        let csv = "UPRN,X_COORDINATE,Y_COORDINATE\n1,0.5,0.5\n";
        let chunks: Vec<Result<Vec<ArealUnit>>> = vec![];
        let (kept, report) =
            filter_in_chunks(chunks, || Ok(BatchReader::new(csv.as_bytes())), 10).unwrap();
        assert!(kept.is_empty());
        assert_eq!((report.read, report.dropped), (1, 1));
    }
}
