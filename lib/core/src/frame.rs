//! Input data model: frames, typed indices and the feature-class layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Feature-class key reserved for text features; numeric classes use 1..
pub const TEXT_CLASS: u32 = 0;

macro_rules! typed_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(i: usize) -> Self {
                $name(i)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_index!(
    /// Position of a frame in the ordered input sequence
    FrameId
);
typed_index!(
    /// Dense id of an output instance
    InstanceId
);
typed_index!(
    /// Index of a codeword within its codebook
    CodewordId
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Numeric(f32),
    Text(String),
}

impl FeatureValue {
    #[inline]
    pub fn as_numeric(&self) -> Option<f32> {
        match self {
            FeatureValue::Numeric(x) => Some(*x),
            FeatureValue::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            FeatureValue::Numeric(_) => None,
        }
    }
}

/// One row of input data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub time: Option<f32>,
    pub features: Vec<FeatureValue>,
    pub labels: Vec<String>,
}

impl Frame {
    pub fn new(name: impl Into<String>, features: Vec<FeatureValue>) -> Self {
        Self {
            name: name.into(),
            time: None,
            features,
            labels: Vec::new(),
        }
    }

    /// Convenience constructor for purely numeric frames
    pub fn numeric(name: impl Into<String>, values: &[f32]) -> Self {
        Self::new(
            name,
            values.iter().map(|&x| FeatureValue::Numeric(x)).collect(),
        )
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![FeatureValue::Text(text.into())])
    }

    #[must_use]
    pub fn with_time(mut self, time: f32) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Numeric values of the given feature columns, in column order
    pub fn numeric_subset(&self, columns: &[usize]) -> Result<Vec<f32>> {
        columns
            .iter()
            .map(|&c| {
                self.features
                    .get(c)
                    .and_then(FeatureValue::as_numeric)
                    .ok_or_else(|| {
                        Error::config(format!(
                            "frame '{}': feature column {} is not numeric",
                            self.name, c
                        ))
                    })
            })
            .collect()
    }

    /// Text of the given feature columns joined by a single space
    pub fn text_subset(&self, columns: &[usize]) -> Result<String> {
        let parts = columns
            .iter()
            .map(|&c| {
                self.features
                    .get(c)
                    .and_then(FeatureValue::as_text)
                    .ok_or_else(|| {
                        Error::config(format!(
                            "frame '{}': feature column {} is not text",
                            self.name, c
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(" "))
    }
}

/// Assignment of every feature column to a feature class.
///
/// Class 0 holds text features; every positive key is one numeric feature
/// group with its own codebook. Iteration is always in ascending key order,
/// which fixes the sub-bag concatenation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    classes: Vec<u32>,
}

impl FeatureLayout {
    pub fn new(classes: Vec<u32>) -> Self {
        Self { classes }
    }

    /// Every column in numeric class 1
    pub fn numeric(num_features: usize) -> Self {
        Self::new(vec![1; num_features])
    }

    /// Infer the layout from a frame: text columns go to class 0, numeric to class 1
    pub fn infer(frame: &Frame) -> Self {
        Self::new(
            frame
                .features
                .iter()
                .map(|f| match f {
                    FeatureValue::Text(_) => TEXT_CLASS,
                    FeatureValue::Numeric(_) => 1,
                })
                .collect(),
        )
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.classes.len()
    }

    /// Class key -> feature columns, ordered by key
    pub fn groups(&self) -> BTreeMap<u32, Vec<usize>> {
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (column, &class) in self.classes.iter().enumerate() {
            groups.entry(class).or_default().push(column);
        }
        groups
    }

    /// All numeric columns in column order
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.classes
            .iter()
            .enumerate()
            .filter(|&(_, &class)| class != TEXT_CLASS)
            .map(|(column, _)| column)
            .collect()
    }

    pub fn has_text(&self) -> bool {
        self.classes.contains(&TEXT_CLASS)
    }

    /// Check that every frame has one value per column with the right kind
    pub fn validate(&self, frames: &[Frame]) -> Result<()> {
        for frame in frames {
            if frame.features.len() != self.classes.len() {
                return Err(Error::InvalidDimension {
                    expected: self.classes.len(),
                    actual: frame.features.len(),
                });
            }
            for (value, &class) in frame.features.iter().zip(&self.classes) {
                let ok = match value {
                    FeatureValue::Text(_) => class == TEXT_CLASS,
                    FeatureValue::Numeric(_) => class != TEXT_CLASS,
                };
                if !ok {
                    return Err(Error::config(format!(
                        "frame '{}' does not match the feature layout",
                        frame.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_groups_are_key_ordered() {
        let layout = FeatureLayout::new(vec![2, 0, 1, 2]);
        let groups = layout.groups();
        let keys: Vec<u32> = groups.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert_eq!(groups[&2], vec![0, 3]);
        assert_eq!(layout.numeric_columns(), vec![0, 2, 3]);
    }

    #[test]
    fn test_infer_layout() {
        let frame = Frame::new(
            "a",
            vec![
                FeatureValue::Text("hello".into()),
                FeatureValue::Numeric(1.0),
            ],
        );
        let layout = FeatureLayout::infer(&frame);
        assert_eq!(layout, FeatureLayout::new(vec![0, 1]));
        assert!(layout.validate(&[frame]).is_ok());
    }

    #[test]
    fn test_subsets() {
        let frame = Frame::new(
            "a",
            vec![
                FeatureValue::Numeric(1.0),
                FeatureValue::Text("x y".into()),
                FeatureValue::Numeric(3.0),
                FeatureValue::Text("z".into()),
            ],
        );
        assert_eq!(frame.numeric_subset(&[0, 2]).unwrap(), vec![1.0, 3.0]);
        assert_eq!(frame.text_subset(&[1, 3]).unwrap(), "x y z");
        assert!(frame.numeric_subset(&[1]).is_err());
    }

    #[test]
    fn test_validate_rejects_width_mismatch() {
        let layout = FeatureLayout::numeric(2);
        let err = layout.validate(&[Frame::numeric("a", &[1.0])]).unwrap_err();
        assert!(matches!(err, Error::InvalidDimension { expected: 2, actual: 1 }));
    }
}
