use crate::{
    datatypes::{Plate, Quad},
    error::AmberError,
};

/// A solver input deck: a title plus named conductor groups of quads, in
/// first-seen name order. The deck is the serialization unit handed to the
/// external solver.
#[derive(Debug, Clone)]
pub struct InputDeck {
    title: String,
    groups: Vec<(String, Vec<Quad>)>,
}

impl InputDeck {
    pub fn new(title: &str) -> InputDeck {
        InputDeck {
            title: title.to_string(),
            groups: Vec::new(),
        }
    }

    /// Appends a quad to the named conductor group, registering the group
    /// on first use. Group order follows first use.
    pub fn add_quad(&mut self, name: &str, quad: Quad) {
        match self.groups.iter_mut().find(|(group, _)| group == name) {
            Some((_, quads)) => quads.push(quad),
            None => self.groups.push((name.to_string(), vec![quad])),
        }
    }

    pub fn add_plate(&mut self, name: &str, plate: &Plate) {
        for quad in &plate.quads {
            self.add_quad(name, *quad);
        }
    }

    /// Renders the complete deck document
    ///
    /// Line-oriented ASCII: a `0 <title>` header; per group a `* <name>`
    /// comment followed by one `Q` line per quad listing its 4 corner
    /// coordinates at 6 significant digits; a bare `*` terminator.
    ///
    /// # Returns
    /// The full document as one String
    pub fn render(&self) -> String {
        let mut document = String::new();

        document.push_str(&format!("0 {}\n", self.title));

        for (name, quads) in &self.groups {
            document.push_str(&format!("* {}\n", name));

            for quad in quads {
                document.push_str(&format!("Q {}", name));
                for point in &quad.points {
                    document.push_str(&format!(
                        " {} {} {}",
                        format_coordinate(point.x),
                        format_coordinate(point.y),
                        format_coordinate(point.z)
                    ));
                }
                document.push('\n');
            }
        }

        document.push_str("*\n");

        document
    }

    /// Persists the deck with a single write. The document is rendered in
    /// memory first so no partial deck ever reaches disk.
    pub fn write(&self, path: &str) -> Result<(), AmberError> {
        std::fs::write(path, self.render()).map_err(|err| {
            AmberError::SolverInvocation(format!("unable to write deck file {}: {}", path, err))
        })
    }
}

const SIGNIFICANT_DIGITS: i32 = 6;

/// Formats a coordinate with 6 significant digits, trailing zeros trimmed.
/// Matches C `%0.6g`: fixed notation while the exponent sits in [-4, 6),
/// exponent notation outside.
fn format_coordinate(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let mut exponent = value.abs().log10().floor() as i32;

    // round to 6 significant digits first; rounding can bump the exponent
    // (e.g. 0.99999995 -> 1)
    let scale = 10f64.powi(SIGNIFICANT_DIGITS - 1 - exponent);
    let rounded = (value * scale).round() / scale;
    if rounded != 0.0 {
        exponent = rounded.abs().log10().floor() as i32;
    }

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS {
        let formatted = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, rounded);
        match formatted.split_once('e') {
            Some((mantissa, exp)) => {
                let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
                format!("{}e{}", mantissa, exp)
            }
            None => formatted,
        }
    } else {
        let decimals = (SIGNIFICANT_DIGITS - 1 - exponent).max(0) as usize;
        let formatted = format!("{:.*}", decimals, rounded);
        if formatted.contains('.') {
            formatted
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            formatted
        }
    }
}
