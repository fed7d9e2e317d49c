//! Node label sets.
//!
//! The fleet manager passes labels as a single comma-separated string. The
//! parsed set keeps input order and does not remove duplicates; the control
//! plane receives exactly what the operator configured.

use serde::Serialize;

use crate::ids::IdError;

/// Ordered list of labels assigned to a data collector node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    /// An empty label set, used to strip every label from a node.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Parse a comma-separated label string such as `"west,batch"`.
    ///
    /// Whitespace around each label is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if any segment is empty, including when the
    /// whole input is blank.
    pub fn parse_csv(input: &str) -> Result<Self, IdError> {
        input
            .split(',')
            .map(|label| {
                let label = label.trim();
                if label.is_empty() {
                    Err(IdError::Empty { kind: "label" })
                } else {
                    Ok(label.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Return the labels as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterate over the labels in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of labels, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
