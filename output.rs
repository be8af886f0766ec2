use std::io::Write;

use crate::error::Result;
use crate::models::{Prediction, PredictionReport};

const BAR_WIDTH: usize = 20;

pub const ABOUT: &str = "\
App Features:
  - Race Prediction: classifies faces as Asian, Black, or White
  - Gender Prediction: identifies as Male or Female
  - Confidence Metrics: shows prediction confidence levels
  - Image Guidelines: works best with clear frontal face images

Limitations:
  - Accuracy Variance: results may vary with image quality and angle
  - Categories: limited to the listed race and gender categories
  - Purpose: for demonstration purposes only

Privacy Notice:
  - No Storage: images are processed in memory and never written to disk
  - Local Only: all processing happens on this machine";

/// Filled cells follow the integer part of the confidence.
pub fn confidence_bar(confidence: f32) -> String {
    let whole = confidence.clamp(0.0, 100.0).trunc() as usize;
    let filled = whole * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn metric_line(name: &str, prediction: &Prediction) -> String {
    format!(
        "{name:<7} {:<7} {:.1}% confidence",
        prediction.label, prediction.confidence
    )
}

pub fn render_text(report: &PredictionReport) -> String {
    let mut out = format!("Image: {}\n", report.source.name());
    if let Some(error) = &report.error {
        out.push_str(&format!("Error: {error}\n"));
        return out;
    }
    let rows = [("Race", &report.race), ("Gender", &report.gender)];
    for (name, prediction) in rows {
        if let Some(prediction) = prediction {
            out.push_str(&metric_line(name, prediction));
            out.push('\n');
        }
    }
    for (name, prediction) in rows {
        if let Some(prediction) = prediction {
            out.push_str(&format!(
                "{} {name} Confidence\n",
                confidence_bar(prediction.confidence)
            ));
        }
    }
    out
}

pub fn write_report<W: Write>(writer: &mut W, report: &PredictionReport, json: bool) -> Result<()> {
    if json {
        writeln!(writer, "{}", serde_json::to_string(report)?)?;
    } else {
        write!(writer, "{}", render_text(report))?;
    }
    Ok(())
}

pub fn write_samples<W: Write>(writer: &mut W, samples: &[String], json: bool) -> Result<()> {
    if json {
        writeln!(writer, "{}", serde_json::to_string(samples)?)?;
    } else if samples.is_empty() {
        writeln!(writer, "No sample images found")?;
    } else {
        writeln!(writer, "Try these sample images:")?;
        for name in samples {
            writeln!(writer, "  {name}")?;
        }
    }
    Ok(())
}
