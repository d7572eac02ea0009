//! Semicolon-separated frame tables in, bag tables out.
//!
//! Input rows are `name[;time];feature...[;label]`. Numeric columns are
//! parsed as floats, anything else becomes a text feature unless explicit
//! feature classes are given.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use xbag_core::{BagOutput, FeatureLayout, FeatureValue, Frame, TEXT_CLASS};

#[derive(Debug, Clone, Default)]
pub struct TableFormat {
    /// Second column holds a timestamp
    pub has_time: bool,
    /// Last column holds a label
    pub has_label: bool,
    /// Feature class per feature column; inferred from the first row when absent
    pub classes: Option<Vec<u32>>,
}

pub fn read_frames(path: &Path, format: &TableFormat) -> Result<(Vec<Frame>, FeatureLayout)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    parse_frames(&text, format).with_context(|| format!("invalid input {}", path.display()))
}

pub fn parse_frames(text: &str, format: &TableFormat) -> Result<(Vec<Frame>, FeatureLayout)> {
    let mut rows = Vec::new();
    for (no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(';').collect();
        let fixed = 1 + usize::from(format.has_time) + usize::from(format.has_label);
        if fields.len() <= fixed {
            bail!("line {}: expected at least {} columns", no + 1, fixed + 1);
        }
        rows.push((no + 1, fields));
    }

    let Some((_, first)) = rows.first() else {
        return Ok((Vec::new(), FeatureLayout::new(format.classes.clone().unwrap_or_default())));
    };
    let feature_start = 1 + usize::from(format.has_time);
    let feature_end = first.len() - usize::from(format.has_label);
    let classes = match &format.classes {
        Some(classes) => classes.clone(),
        None => first[feature_start..feature_end]
            .iter()
            .map(|f| if f.trim().parse::<f32>().is_ok() { 1 } else { TEXT_CLASS })
            .collect(),
    };
    if classes.len() != feature_end - feature_start {
        bail!(
            "{} feature classes given for {} feature columns",
            classes.len(),
            feature_end - feature_start
        );
    }

    let mut frames = Vec::with_capacity(rows.len());
    for (no, fields) in &rows {
        if fields.len() != first.len() {
            bail!("line {}: expected {} columns, found {}", no, first.len(), fields.len());
        }
        let features = fields[feature_start..feature_end]
            .iter()
            .zip(&classes)
            .map(|(field, &class)| {
                if class == TEXT_CLASS {
                    Ok(FeatureValue::Text(field.to_string()))
                } else {
                    field
                        .trim()
                        .parse()
                        .map(FeatureValue::Numeric)
                        .with_context(|| format!("line {}: invalid number '{}'", no, field))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut frame = Frame::new(fields[0], features);
        if format.has_time {
            let time: f32 = fields[1]
                .trim()
                .parse()
                .with_context(|| format!("line {}: invalid time '{}'", no, fields[1]))?;
            frame = frame.with_time(time);
        }
        if format.has_label {
            frame = frame.with_label(fields[fields.len() - 1]);
        }
        frames.push(frame);
    }
    Ok((frames, FeatureLayout::new(classes)))
}

/// One row per instance: `name[;center];values...[;labels...]`
pub fn format_bag(output: &BagOutput) -> String {
    let mut out = String::new();
    for (instance, row) in output.instances.iter().zip(&output.bag) {
        out.push_str(&instance.name);
        if let Some(center) = instance.center {
            out.push_str(&format!(";{}", center));
        }
        for value in row {
            out.push_str(&format!(";{}", value));
        }
        for label in &instance.labels {
            out.push(';');
            out.push_str(label);
        }
        out.push('\n');
    }
    out
}

/// Per-frame codeword indices of every numeric codebook, one line per frame
pub fn format_assignments(output: &BagOutput) -> String {
    let num_frames = output.assignments.first().map_or(0, Vec::len);
    let mut out = String::new();
    for frame in 0..num_frames {
        let indices: Vec<String> = output
            .assignments
            .iter()
            .flat_map(|per_book| per_book[frame].iter().map(|c| c.to_string()))
            .collect();
        out.push_str(&indices.join(";"));
        out.push('\n');
    }
    out
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xbag_core::Instance;

    #[test]
    fn test_parse_with_time_and_label() {
        let text = "a;0.0;1.5;hello world;pos\na;0.1;2.5;bye;pos\n";
        let format = TableFormat {
            has_time: true,
            has_label: true,
            classes: None,
        };
        let (frames, layout) = parse_frames(text, &format).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(layout, FeatureLayout::new(vec![1, 0]));
        assert_eq!(frames[1].time, Some(0.1));
        assert_eq!(frames[0].labels, vec!["pos".to_string()]);
        assert_eq!(frames[0].features[1], FeatureValue::Text("hello world".into()));
    }

    #[test]
    fn test_explicit_classes() {
        let format = TableFormat {
            classes: Some(vec![1, 2]),
            ..Default::default()
        };
        let (frames, layout) = parse_frames("x;1;2\n\ny;3;4\n", &format).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(layout.groups().len(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(parse_frames("x;1;2\ny;3\n", &TableFormat::default()).is_err());
        assert!(parse_frames("x;1\ny;abc\n", &TableFormat::default()).is_err());
    }

    #[test]
    fn test_format_bag() {
        let output = BagOutput {
            instances: vec![Instance {
                name: "a".into(),
                center: Some(0.5),
                labels: vec!["pos".into()],
                num_frames: 2,
            }],
            bag: vec![vec![2.0, 0.25]],
            assignments: Vec::new(),
        };
        assert_eq!(format_bag(&output), "a;0.5;2;0.25;pos\n");

        let untimed = BagOutput {
            instances: vec![Instance {
                name: "b".into(),
                center: None,
                labels: vec!["x".into(), "y".into()],
                num_frames: 1,
            }],
            bag: vec![vec![1.0]],
            assignments: Vec::new(),
        };
        assert_eq!(format_bag(&untimed), "b;1;x;y\n");
        assert_eq!(format_assignments(&output), "");
    }
}
