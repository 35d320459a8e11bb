use std::f64::consts::PI;

use indicatif::ProgressBar;
use json::JsonValue;
use nalgebra::Vector3;
use rand::Rng;

use crate::{
    datatypes::{
        CapacitanceMatrix, ExperimentConfig, ELECTRODE_1, ELECTRODE_2, PARTICLE_1, PARTICLE_2,
    },
    deck::InputDeck,
    error::AmberError,
    geometry,
    solver::{parse_output, CapacitanceSolver},
};

const DEFAULT_MAX_ATTEMPTS: usize = 25;
const DEFAULT_DECK_FILE: &str = "amber.inp";

/// Parses the experiment input file into an ExperimentConfig
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// An ExperimentConfig instance
pub fn load_config(input_file: &str) -> Result<ExperimentConfig, AmberError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(AmberError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    let input_json = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(AmberError::Input(format!(
                "Error in input file json: {}",
                err
            )))
        }
    };

    parse_config(&input_json)
}

fn parse_config(input_json: &JsonValue) -> Result<ExperimentConfig, AmberError> {
    for section in ["particle", "electrodes", "box"] {
        if !input_json.has_key(section) {
            return Err(AmberError::Input(format!(
                "Input json missing {} section",
                section
            )));
        }
    }

    let trials = input_json["trials"].as_usize();
    let particle_width_x = input_json["particle"]["width_x"].as_f64();
    let particle_width_y = input_json["particle"]["width_y"].as_f64();
    let particle_divisions = input_json["particle"]["divisions"].as_usize();
    let particle_gap = input_json["particle"]["gap"].as_f64();
    let electrode_divisions = input_json["electrodes"]["divisions"].as_usize();
    let box_x = input_json["box"]["x"].as_f64();
    let box_y = input_json["box"]["y"].as_f64();
    let box_z = input_json["box"]["z"].as_f64();

    if trials.is_none() {
        return Err(AmberError::Input(
            "Input json missing trial count".to_owned(),
        ));
    }
    if particle_width_x.is_none() || particle_width_y.is_none() {
        return Err(AmberError::Input(
            "Input json missing particle width_x/width_y".to_owned(),
        ));
    }
    if particle_divisions.is_none() {
        return Err(AmberError::Input(
            "Input json missing particle divisions".to_owned(),
        ));
    }
    if particle_gap.is_none() {
        return Err(AmberError::Input(
            "Input json missing particle gap".to_owned(),
        ));
    }
    if electrode_divisions.is_none() {
        return Err(AmberError::Input(
            "Input json missing electrode divisions".to_owned(),
        ));
    }
    if box_x.is_none() || box_y.is_none() || box_z.is_none() {
        return Err(AmberError::Input(
            "Input json missing box x/y/z dimensions".to_owned(),
        ));
    }

    let max_attempts = match input_json["max_attempts"].as_usize() {
        Some(0) => {
            return Err(AmberError::Input(
                "max_attempts must be positive".to_owned(),
            ))
        }
        Some(n) => n,
        None => DEFAULT_MAX_ATTEMPTS,
    };

    let deck_file = input_json["deck_file"]
        .as_str()
        .unwrap_or(DEFAULT_DECK_FILE)
        .to_string();

    Ok(ExperimentConfig {
        trials: trials.unwrap(),
        particle_width_x: particle_width_x.unwrap(),
        particle_width_y: particle_width_y.unwrap(),
        particle_divisions: particle_divisions.unwrap(),
        particle_gap: particle_gap.unwrap(),
        electrode_divisions: electrode_divisions.unwrap(),
        box_x: box_x.unwrap(),
        box_y: box_y.unwrap(),
        box_z: box_z.unwrap(),
        max_attempts,
        deck_file,
    })
}

/// Reduces a capacitance matrix to the scalar asymmetry figure of merit
///
/// The five couplings between the two particles and the two electrodes
/// combine into a signed, dimensionless measure of how unevenly the
/// particle pair couples to the electrodes:
///
/// fom = (C1*C4 - C2*C3)
///     / (C1*C2 + C1*C4 + C2*C3 + C3*C4 + Cm*(C1 + C2 + C3 + C4))
///
/// # Arguments
/// * `matrix` - A parsed capacitance matrix holding all four groups
///
/// # Returns
/// The signed figure of merit
pub fn calc_fom(matrix: &CapacitanceMatrix) -> Result<f64, AmberError> {
    let c1 = coupling(matrix, ELECTRODE_1, PARTICLE_1)?;
    let c2 = coupling(matrix, ELECTRODE_1, PARTICLE_2)?;
    let c3 = coupling(matrix, ELECTRODE_2, PARTICLE_2)?;
    let c4 = coupling(matrix, ELECTRODE_2, PARTICLE_1)?;
    let cm = coupling(matrix, PARTICLE_1, PARTICLE_2)?;

    let numerator = c1 * c4 - c2 * c3;
    let denominator = c1 * c2 + c1 * c4 + c2 * c3 + c3 * c4 + cm * (c1 + c2 + c3 + c4);

    if denominator == 0.0 {
        return Err(AmberError::DegenerateGeometry(
            "all electrode-particle couplings collapsed to zero".to_owned(),
        ));
    }

    Ok(numerator / denominator)
}

fn coupling(matrix: &CapacitanceMatrix, row: &str, col: &str) -> Result<f64, AmberError> {
    match matrix.get(row, col) {
        Some(value) => Ok(value.abs()),
        None => Err(AmberError::MissingConductor(format!(
            "{}/{} missing from the capacitance matrix",
            row, col
        ))),
    }
}

/// Runs the Monte Carlo trial loop
///
/// Each trial samples a fresh randomized geometry, solves it externally,
/// and records the absolute figure of merit. Transient failures (solver
/// invocation, output parsing, degenerate reduction) discard the attempt
/// and re-sample the same trial slot until the attempt budget runs out;
/// anything else aborts the run immediately.
///
/// # Arguments
/// * `config` - The experiment parameters
/// * `solver` - The external solver collaborator
/// * `rng` - Source of trial randomness
///
/// # Returns
/// One recorded |fom| sample per trial, in trial order
pub fn run<R: Rng>(
    config: &ExperimentConfig,
    solver: &dyn CapacitanceSolver,
    rng: &mut R,
) -> Result<Vec<f64>, AmberError> {
    println!("info: running {} trials", config.trials);

    let mut samples: Vec<f64> = Vec::with_capacity(config.trials);
    let bar = ProgressBar::new(config.trials as u64);

    for trial in 0..config.trials {
        let mut attempts = 0;

        let fom = loop {
            attempts += 1;

            match run_trial(config, solver, rng, trial) {
                Ok(fom) => break fom,
                Err(err) if err.is_transient() => {
                    if attempts >= config.max_attempts {
                        bar.abandon();
                        return Err(AmberError::TrialAbandoned {
                            trial,
                            attempts,
                            last: Box::new(err),
                        });
                    }
                }
                Err(err) => {
                    bar.abandon();
                    println!("error: trial {} aborted the run", trial + 1);
                    return Err(err);
                }
            }
        };

        samples.push(fom.abs());
        bar.inc(1);
    }

    bar.finish();
    println!("info: recorded {} samples", samples.len());

    Ok(samples)
}

/// Runs one trial attempt: sample a geometry, solve it, reduce the result.
fn run_trial<R: Rng>(
    config: &ExperimentConfig,
    solver: &dyn CapacitanceSolver,
    rng: &mut R,
    trial: usize,
) -> Result<f64, AmberError> {
    // the particle pair: two small plates split by the gap along z
    let plate = geometry::make_plate(
        config.particle_width_x,
        config.particle_width_y,
        config.particle_divisions,
        config.particle_divisions,
    )?;
    let p1 = geometry::offset(&plate, Vector3::new(0.0, 0.0, -config.particle_gap / 2.0));
    let p2 = geometry::offset(&plate, Vector3::new(0.0, 0.0, config.particle_gap / 2.0));

    // the pair moves rigidly: one shared rotation, one shared translation
    let rotation = geometry::rotation_xyz(
        2.0 * PI * rng.gen::<f64>(),
        2.0 * PI * rng.gen::<f64>(),
        2.0 * PI * rng.gen::<f64>(),
    );
    let p1 = geometry::rotate(&p1, &rotation);
    let p2 = geometry::rotate(&p2, &rotation);

    let shift = Vector3::new(
        config.box_x * (rng.gen::<f64>() - 0.5),
        config.box_y * (rng.gen::<f64>() - 0.5),
        config.box_z * (rng.gen::<f64>() - 0.5),
    );
    let p1 = geometry::offset(&p1, shift);
    let p2 = geometry::offset(&p2, shift);

    // electrodes span the bounding box, fixed at the z extremes
    let electrode = geometry::make_plate(
        config.box_x,
        config.box_y,
        config.electrode_divisions,
        config.electrode_divisions,
    )?;
    let e1 = geometry::offset(&electrode, Vector3::new(0.0, 0.0, -config.box_z / 2.0));
    let e2 = geometry::offset(&electrode, Vector3::new(0.0, 0.0, config.box_z / 2.0));

    let mut deck = InputDeck::new(&format!("trial {}", trial + 1));
    deck.add_plate(PARTICLE_1, &p1);
    deck.add_plate(PARTICLE_2, &p2);
    deck.add_plate(ELECTRODE_1, &e1);
    deck.add_plate(ELECTRODE_2, &e2);

    deck.write(&config.deck_file)?;
    let console = solver.solve(&config.deck_file)?;
    let _ = std::fs::remove_file(&config.deck_file);

    let matrix = parse_output(&console)?;

    calc_fom(&matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::cell::Cell;
    use std::io::Write;

    /// Console text whose couplings give fom = -2/29.
    const CANNED_CONSOLE: &str = "\
Solving trial deck...
CAPACITANCE MATRIX, picofarads
       1       2       3       4
particle1%GROUP1 1    10     0.5     1     4
particle2%GROUP2 2    0.5    10      2     3
electrode1%GROUP3 3   1      2       20   -5
electrode2%GROUP4 4   4      3      -5     20
";

    struct CannedSolver;

    impl CapacitanceSolver for CannedSolver {
        fn solve(&self, _deck_path: &str) -> Result<String, AmberError> {
            Ok(CANNED_CONSOLE.to_string())
        }
    }

    /// Fails the first `failures` solve calls, then behaves like
    /// CannedSolver.
    struct FlakySolver {
        failures: Cell<usize>,
    }

    impl CapacitanceSolver for FlakySolver {
        fn solve(&self, _deck_path: &str) -> Result<String, AmberError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(AmberError::SolverInvocation(
                    "simulated solver crash".to_owned(),
                ));
            }
            Ok(CANNED_CONSOLE.to_string())
        }
    }

    struct BrokenSolver;

    impl CapacitanceSolver for BrokenSolver {
        fn solve(&self, _deck_path: &str) -> Result<String, AmberError> {
            Err(AmberError::SolverInvocation(
                "simulated solver crash".to_owned(),
            ))
        }
    }

    fn test_config(deck_file: &str) -> ExperimentConfig {
        ExperimentConfig {
            trials: 3,
            particle_width_x: 1e-3,
            particle_width_y: 1e-3,
            particle_divisions: 2,
            particle_gap: 1e-3,
            electrode_divisions: 2,
            box_x: 0.1,
            box_y: 0.1,
            box_z: 0.1,
            max_attempts: 4,
            deck_file: deck_file.to_string(),
        }
    }

    fn deck_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("amber.inp").to_str().unwrap().to_string()
    }

    fn canned_matrix() -> CapacitanceMatrix {
        parse_output(CANNED_CONSOLE).unwrap()
    }

    #[test]
    fn fom_matches_worked_example() {
        // C1=1, C2=2, C3=3, C4=4, Cm=0.5 (picofarads) -> -2/29
        let fom = calc_fom(&canned_matrix()).unwrap();
        assert_relative_eq!(fom, -2.0 / 29.0, epsilon = 1e-12);
    }

    #[test]
    fn fom_is_degenerate_when_couplings_vanish() {
        let names = vec![
            PARTICLE_1.to_string(),
            PARTICLE_2.to_string(),
            ELECTRODE_1.to_string(),
            ELECTRODE_2.to_string(),
        ];
        let matrix = CapacitanceMatrix::new(names, vec![0.0; 16]);

        assert!(matches!(
            calc_fom(&matrix),
            Err(AmberError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn fom_requires_all_four_groups() {
        let names = vec![PARTICLE_1.to_string(), PARTICLE_2.to_string()];
        let matrix = CapacitanceMatrix::new(names, vec![1e-12; 4]);

        assert!(matches!(
            calc_fom(&matrix),
            Err(AmberError::MissingConductor(_))
        ));
    }

    #[test]
    fn records_one_sample_per_trial() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&deck_path(&dir));
        let mut rng = StdRng::seed_from_u64(7);

        let samples = run(&config, &CannedSolver, &mut rng).unwrap();

        assert_eq!(samples.len(), 3);
        for sample in samples {
            assert_relative_eq!(sample, 2.0 / 29.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn retries_transient_failures_without_losing_samples() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&deck_path(&dir));
        let mut rng = StdRng::seed_from_u64(11);

        let solver = FlakySolver {
            failures: Cell::new(3),
        };
        let samples = run(&config, &solver, &mut rng).unwrap();

        // failed attempts never shorten the recorded sequence
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn abandons_a_trial_after_the_attempt_budget() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&deck_path(&dir));
        let mut rng = StdRng::seed_from_u64(13);

        match run(&config, &BrokenSolver, &mut rng) {
            Err(AmberError::TrialAbandoned {
                trial, attempts, ..
            }) => {
                assert_eq!(trial, 0);
                assert_eq!(attempts, 4);
            }
            other => panic!("expected TrialAbandoned, got {:?}", other),
        }
    }

    #[test]
    fn invalid_geometry_is_fatal_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&deck_path(&dir));
        config.particle_width_x = -1.0;
        let mut rng = StdRng::seed_from_u64(17);

        assert!(matches!(
            run(&config, &CannedSolver, &mut rng),
            Err(AmberError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn loads_a_complete_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{
                "trials": 5000,
                "max_attempts": 10,
                "deck_file": "trial.inp",
                "particle": { "width_x": 1e-3, "width_y": 1e-3, "divisions": 10, "gap": 1e-3 },
                "electrodes": { "divisions": 10 },
                "box": { "x": 0.1, "y": 0.1, "z": 0.1 }
            }"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();

        assert_eq!(config.trials, 5000);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.deck_file, "trial.inp");
        assert_eq!(config.particle_divisions, 10);
        assert_relative_eq!(config.particle_gap, 1e-3);
        assert_relative_eq!(config.box_z, 0.1);
    }

    #[test]
    fn config_defaults_and_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        std::fs::write(
            &path,
            r#"{
                "trials": 5,
                "particle": { "width_x": 1e-3, "width_y": 1e-3, "divisions": 10, "gap": 1e-3 },
                "electrodes": { "divisions": 10 },
                "box": { "x": 0.1, "y": 0.1, "z": 0.1 }
            }"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.deck_file, DEFAULT_DECK_FILE);

        std::fs::write(&path, r#"{ "trials": 5, "particle": {}, "electrodes": {}, "box": {} }"#)
            .unwrap();
        assert!(matches!(
            load_config(path.to_str().unwrap()),
            Err(AmberError::Input(_))
        ));
    }
}
