//! First-order (queen's case) neighbours of areal units.
//!
//! Two units are neighbours when their geometries are not disjoint, i.e.
//! they share an edge, a corner, or overlap. Every unit neighbours itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo::Intersects;
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::assign::envelope;
use crate::error::{Error, Result};
use crate::model::ArealUnit;

/// Areal unit code -> codes of the units it is not disjoint from,
/// itself included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Neighbours(BTreeMap<String, BTreeSet<String>>);

impl Neighbours {
    pub fn get(&self, code: &str) -> Option<&BTreeSet<String>> {
        self.0.get(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_unit(&self, code: &str) -> bool {
        self.0.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    /// Record `a` and `b` as neighbours of each other.
    pub fn link(&mut self, a: &str, b: &str) {
        self.0.entry(a.to_string()).or_default().insert(b.to_string());
        self.0.entry(b.to_string()).or_default().insert(a.to_string());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| Error::io(path, e))?;
        log::info!("saved neighbours of {} units to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let neighbours: Neighbours = serde_json::from_reader(BufReader::new(file))?;
        log::info!("loaded neighbours of {} units from {}", neighbours.len(), path.display());
        Ok(neighbours)
    }
}

impl FromIterator<(String, BTreeSet<String>)> for Neighbours {
    fn from_iter<I: IntoIterator<Item = (String, BTreeSet<String>)>>(iter: I) -> Self {
        Neighbours(iter.into_iter().collect())
    }
}

/// Build the neighbour sets of every unit.
///
/// Candidate pairs come from intersecting bounding boxes; each unordered
/// pair gets one exact `Intersects` test and is linked both ways when it
/// passes, so the relation is symmetric by construction.
pub fn build_neighbours(units: &[ArealUnit]) -> Neighbours {
    let entries: Vec<GeomWithData<Rectangle<[f64; 2]>, usize>> = units
        .iter()
        .enumerate()
        .filter_map(|(i, unit)| {
            let env = envelope(&unit.geometry)?;
            Some(GeomWithData::new(Rectangle::from_aabb(env), i))
        })
        .collect();
    let tree = RTree::bulk_load(entries);

    let pairs: Vec<(usize, usize)> = (0..units.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let query = envelope(&units[i].geometry);
            let candidates: Vec<usize> = match query {
                Some(env) => tree
                    .locate_in_envelope_intersecting(&env)
                    .map(|entry| entry.data)
                    .filter(|&j| j > i)
                    .filter(|&j| units[i].geometry.intersects(&units[j].geometry))
                    .collect(),
                None => vec![],
            };
            candidates.into_iter().map(move |j| (i, j))
        })
        .collect();

    let mut neighbours = Neighbours::default();
    for unit in units {
        neighbours.link(&unit.code, &unit.code);
    }
    for (i, j) in pairs {
        neighbours.link(&units[i].code, &units[j].code);
    }
    log::info!(
        "found {} neighbouring pairs among {} units",
        neighbours.iter().map(|(_, n)| n.len() - 1).sum::<usize>() / 2,
        units.len()
    );
    neighbours
}
