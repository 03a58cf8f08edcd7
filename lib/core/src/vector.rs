use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{Error, Result};

/// A dense vector of `f32` components as stored in a shadow index column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Parse a JSON array of numbers, as stored in a record field or sent as search criteria.
    pub fn from_json(field: &str, value: &Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| {
            Error::Validation(format!("{} must be an array of numbers", field))
        })?;

        let mut data = Vec::with_capacity(items.len());
        for item in items {
            let n = item.as_f64().ok_or_else(|| {
                Error::Validation(format!("{} must only contain numbers", field))
            })?;
            data.push(n as f32);
        }

        let vector = Self { data };
        vector.check_finite(field)?;
        Ok(vector)
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Reject a vector whose length disagrees with the declared dimensionality.
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.dim() != expected {
            return Err(Error::InvalidDimension {
                expected,
                actual: self.dim(),
            });
        }
        Ok(())
    }

    /// Reject NaN and infinite components.
    pub fn check_finite(&self, field: &str) -> Result<()> {
        if self.data.iter().any(|x| !x.is_finite()) {
            return Err(Error::Validation(format!(
                "{} must only contain finite values",
                field
            )));
        }
        Ok(())
    }

    /// Euclidean distance, `f32::INFINITY` on a length mismatch.
    #[inline]
    pub fn l2_distance(&self, other: &[f32]) -> f32 {
        crate::simd::l2_distance_simd(&self.data, other)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}
