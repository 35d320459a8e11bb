use std::collections::HashMap;

use nalgebra::Vector3;

pub const PARTICLE_1: &str = "particle1";
pub const PARTICLE_2: &str = "particle2";
pub const ELECTRODE_1: &str = "electrode1";
pub const ELECTRODE_2: &str = "electrode2";

/// One planar rectangular facet of a discretized conductor surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub points: [Vector3<f64>; 4],
}

/// A conductor surface discretized into an ordered grid of quads.
#[derive(Debug, Clone)]
pub struct Plate {
    pub quads: Vec<Quad>,
}

/// Square matrix of self/mutual capacitance terms between conductor groups,
/// in farads. Values are row-major in row-discovery order; lookups go
/// through the name table. Solver noise means the matrix is only
/// near-symmetric, so consumers take absolute values.
#[derive(Debug, Clone)]
pub struct CapacitanceMatrix {
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<f64>,
}

impl CapacitanceMatrix {
    pub fn new(names: Vec<String>, values: Vec<f64>) -> CapacitanceMatrix {
        debug_assert_eq!(values.len(), names.len() * names.len());

        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        CapacitanceMatrix {
            names,
            index,
            values,
        }
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Looks up the capacitance term between two named conductor groups.
    /// Returns None if either name never appeared in the solver output.
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let row = *self.index.get(row)?;
        let col = *self.index.get(col)?;

        Some(self.values[row * self.names.len() + col])
    }
}

/// Experiment parameters loaded from the input json.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub trials: usize,
    pub particle_width_x: f64,
    pub particle_width_y: f64,
    pub particle_divisions: usize,
    pub particle_gap: f64,
    pub electrode_divisions: usize,
    pub box_x: f64,
    pub box_y: f64,
    pub box_z: f64,
    pub max_attempts: usize,
    pub deck_file: String,
}
