use crate::error::AmberError;

/// Summary statistics over the recorded sample sequence.
#[derive(Debug, Clone, Copy)]
pub struct SampleSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

/// Computes mean, median, and population standard deviation. Returns None
/// for an empty sequence.
pub fn summarize(samples: &[f64]) -> Option<SampleSummary> {
    if samples.is_empty() {
        return None;
    }

    let count = samples.len();
    let mean = samples.iter().sum::<f64>() / count as f64;

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;

    Some(SampleSummary {
        mean,
        median,
        std_dev: variance.sqrt(),
    })
}

/// Writes the recorded samples to a text file, one per line
///
/// The document is built in memory and persisted with a single write.
///
/// # Arguments
/// * `samples` - The recorded sample sequence
/// * `output` - The filename of the output samples file
pub fn write_samples(samples: &[f64], output: &str) -> Result<(), AmberError> {
    let mut document = String::new();
    for sample in samples {
        document.push_str(&format!("{:e}\n", sample));
    }

    std::fs::write(output, document).map_err(|err| {
        AmberError::PostProcessor(format!("Failed to write samples to {}: {}", output, err))
    })?;

    println!("info: wrote {} samples to {}", samples.len(), output);

    Ok(())
}

pub fn print_summary(samples: &[f64]) {
    match summarize(samples) {
        Some(summary) => {
            println!("Mean: {}", summary.mean);
            println!("Median: {}", summary.median);
            println!("Standard Dev: {}", summary.std_dev);
        }
        None => println!("warning: no samples recorded"),
    }
}
