use std::process::Command;

use crate::{datatypes::CapacitanceMatrix, error::AmberError};

/// External capacitance solver collaborator: given a written deck, produce
/// captured console text or fail. The experiment loop only ever talks to
/// the solver through this boundary.
pub trait CapacitanceSolver {
    fn solve(&self, deck_path: &str) -> Result<String, AmberError>;
}

/// Invokes the FastCap boundary-element solver as a subprocess. No
/// streaming and no stdin; the deck travels by file path and the result
/// comes back as captured stdout.
pub struct FastCap {
    binary: String,
}

impl FastCap {
    pub fn new(binary: &str) -> FastCap {
        FastCap {
            binary: binary.to_string(),
        }
    }
}

impl CapacitanceSolver for FastCap {
    fn solve(&self, deck_path: &str) -> Result<String, AmberError> {
        let output = match Command::new(&self.binary).arg(deck_path).output() {
            Ok(out) => out,
            Err(err) => {
                return Err(AmberError::SolverInvocation(format!(
                    "{} failed to start: {}",
                    self.binary, err
                )));
            }
        };

        if !output.status.success() {
            return Err(AmberError::SolverInvocation(format!(
                "{} exited with {}",
                self.binary, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

const HEADER_TOKEN: &str = "CAPACITANCE MATRIX";

const UNIT_PREFIXES: [(&str, f64); 6] = [
    ("atto", 1e-18),
    ("femto", 1e-15),
    ("pico", 1e-12),
    ("nano", 1e-9),
    ("micro", 1e-6),
    ("milli", 1e-3),
];

/// Extracts the capacitance matrix from the solver's console output
///
/// Grammar: a `CAPACITANCE MATRIX, <unit>farads` header somewhere in the
/// text; a line of whitespace-separated integers whose maximum is the
/// matrix dimension N; then N rows, each a `<name>%GROUP<index>` label
/// followed by the row's N entries. Entries are scaled from the header
/// unit into farads.
///
/// # Arguments
/// * `console` - The captured console text
///
/// # Returns
/// A name-indexed CapacitanceMatrix in farads
pub fn parse_output(console: &str) -> Result<CapacitanceMatrix, AmberError> {
    let lines: Vec<&str> = console.lines().collect();

    let header_idx = match lines.iter().position(|line| line.starts_with(HEADER_TOKEN)) {
        Some(idx) => idx,
        None => {
            return Err(AmberError::MissingHeader(
                "solver output has no CAPACITANCE MATRIX line".to_string(),
            ));
        }
    };
    let scalar = unit_scalar(lines[header_idx], header_idx + 1)?;

    // the line after the header indexes the columns; its maximum is the
    // matrix dimension
    let size_idx = header_idx + 1;
    let size_line = match lines.get(size_idx) {
        Some(line) => line,
        None => {
            return Err(malformed_row(
                size_idx + 1,
                "expected a matrix size line after the header".to_string(),
            ));
        }
    };

    let mut size: usize = 0;
    for token in size_line.split_whitespace() {
        let value: usize = token.parse().map_err(|_| {
            malformed_row(
                size_idx + 1,
                format!("non-integer token '{}' in matrix size line", token),
            )
        })?;
        size = size.max(value);
    }
    if size == 0 {
        return Err(malformed_row(
            size_idx + 1,
            "matrix size line holds no positive integer".to_string(),
        ));
    }

    let mut names: Vec<String> = Vec::with_capacity(size);
    let mut values: Vec<f64> = vec![0.0; size * size];

    for row in 0..size {
        let line_idx = size_idx + 1 + row;
        let line = match lines.get(line_idx) {
            Some(line) => line,
            None => {
                return Err(malformed_row(
                    line_idx + 1,
                    "solver output ended before the matrix was complete".to_string(),
                ));
            }
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < size + 1 {
            return Err(malformed_row(
                line_idx + 1,
                format!(
                    "expected at least {} tokens, found {}",
                    size + 1,
                    tokens.len()
                ),
            ));
        }

        let name = parse_label(tokens[0], line_idx + 1)?;
        if names.contains(&name) {
            return Err(malformed_row(
                line_idx + 1,
                format!("duplicate conductor label '{}'", name),
            ));
        }
        names.push(name);

        // the solver echoes the row index between the label and the
        // entries; the entries are the trailing N tokens
        for (col, token) in tokens[tokens.len() - size..].iter().enumerate() {
            let entry: f64 = token.parse().map_err(|_| {
                malformed_row(line_idx + 1, format!("non-numeric entry '{}'", token))
            })?;
            values[row * size + col] = scalar * entry;
        }
    }

    Ok(CapacitanceMatrix::new(names, values))
}

fn malformed_row(line: usize, reason: String) -> AmberError {
    AmberError::MalformedRow { line, reason }
}

/// Maps the header's unit prefix onto a farad scalar. The header must read
/// `CAPACITANCE MATRIX, <unit>farads`.
fn unit_scalar(header: &str, line_no: usize) -> Result<f64, AmberError> {
    let unit = header
        .strip_prefix(HEADER_TOKEN)
        .and_then(|rest| rest.trim_start().strip_prefix(','))
        .map(str::trim)
        .and_then(|rest| rest.strip_suffix("farads"));

    let unit = match unit {
        Some(unit) => unit,
        None => {
            return Err(AmberError::UnrecognizedUnit(format!(
                "line {}: malformed capacitance header '{}'",
                line_no, header
            )));
        }
    };

    for (prefix, scalar) in UNIT_PREFIXES {
        if unit == prefix {
            return Ok(scalar);
        }
    }

    Err(AmberError::UnrecognizedUnit(format!(
        "line {}: unknown unit prefix '{}'",
        line_no, unit
    )))
}

/// Pulls the conductor name out of a `<name>%GROUP<index>` row label. The
/// group index is solver bookkeeping and is dropped.
fn parse_label(token: &str, line_no: usize) -> Result<String, AmberError> {
    let (name, group) = match token.split_once('%') {
        Some(parts) => parts,
        None => {
            return Err(malformed_row(
                line_no,
                format!("conductor label '{}' is missing a %GROUP suffix", token),
            ));
        }
    };

    let index = match group.strip_prefix("GROUP") {
        Some(index) => index,
        None => {
            return Err(malformed_row(
                line_no,
                format!("conductor label '{}' is missing a %GROUP suffix", token),
            ));
        }
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed_row(
            line_no,
            format!("conductor name '{}' is not alphanumeric", name),
        ));
    }
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed_row(
            line_no,
            format!("group index '{}' is not numeric", index),
        ));
    }

    Ok(name.to_string())
}
