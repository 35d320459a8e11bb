use std::fmt::Display;

#[derive(Debug)]
pub enum AmberError {
    /// Problems with the experiment input file. Fatal.
    Input(String),
    /// Malformed plate parameters. Fatal: a configuration bug, not a
    /// transient condition.
    InvalidGeometry(String),
    /// The external solver failed to run or exited non-zero.
    SolverInvocation(String),
    /// No capacitance matrix header in the solver output.
    MissingHeader(String),
    /// The capacitance matrix header names an unknown unit prefix.
    UnrecognizedUnit(String),
    /// A matrix row in the solver output could not be read. `line` is the
    /// 1-based line number within the captured console text.
    MalformedRow { line: usize, reason: String },
    /// A conductor group required by the reduction never appeared in the
    /// parsed matrix.
    MissingConductor(String),
    /// The figure-of-merit denominator collapsed to zero.
    DegenerateGeometry(String),
    /// A trial slot used up its retry budget. Carries the last transient
    /// failure seen.
    TrialAbandoned {
        trial: usize,
        attempts: usize,
        last: Box<AmberError>,
    },
    /// Problems persisting the recorded samples. Fatal.
    PostProcessor(String),
}

impl AmberError {
    /// Transient errors spoil a single trial attempt without implicating
    /// the whole run; the orchestrator retries them. Everything else
    /// propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AmberError::SolverInvocation(_)
                | AmberError::MissingHeader(_)
                | AmberError::UnrecognizedUnit(_)
                | AmberError::MalformedRow { .. }
                | AmberError::MissingConductor(_)
                | AmberError::DegenerateGeometry(_)
        )
    }
}

impl Display for AmberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmberError::Input(v) => write!(f, "Input error: {}", v),
            AmberError::InvalidGeometry(v) => write!(f, "Invalid geometry: {}", v),
            AmberError::SolverInvocation(v) => write!(f, "Solver invocation error: {}", v),
            AmberError::MissingHeader(v) => write!(f, "Missing header: {}", v),
            AmberError::UnrecognizedUnit(v) => write!(f, "Unrecognized unit: {}", v),
            AmberError::MalformedRow { line, reason } => {
                write!(f, "Malformed row at line {}: {}", line, reason)
            }
            AmberError::MissingConductor(v) => write!(f, "Missing conductor: {}", v),
            AmberError::DegenerateGeometry(v) => write!(f, "Degenerate geometry: {}", v),
            AmberError::TrialAbandoned {
                trial,
                attempts,
                last,
            } => write!(
                f,
                "Trial {} abandoned after {} attempts; last failure: {}",
                trial + 1,
                attempts,
                last
            ),
            AmberError::PostProcessor(v) => write!(f, "Post processor error: {}", v),
        }
    }
}
