//! Where a design sits on the garment mockup.

use serde::{Deserialize, Serialize};

/// Largest scale factor accepted from the editor.
pub const MAX_SCALE: f64 = 10.0;

/// Errors from [`Placement::new`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error("placement coordinates must be finite numbers")]
    NonFinite,
    #[error("scale must be greater than 0 and at most 10")]
    ScaleOutOfRange,
}

/// Position and scale of a design relative to the mockup's print area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "position_x")]
    pub x: f64,
    #[serde(rename = "position_y")]
    pub y: f64,
    pub scale: f64,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl Placement {
    /// Build a placement, rejecting NaN/infinite values and out-of-range scale.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError`] if any component is invalid.
    pub fn new(x: f64, y: f64, scale: f64) -> Result<Self, PlacementError> {
        if !(x.is_finite() && y.is_finite() && scale.is_finite()) {
            return Err(PlacementError::NonFinite);
        }
        if scale <= 0.0 || scale > MAX_SCALE {
            return Err(PlacementError::ScaleOutOfRange);
        }
        Ok(Self { x, y, scale })
    }

    /// Fill missing components with defaults, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError`] if the resulting placement is invalid.
    pub fn from_parts(
        x: Option<f64>,
        y: Option<f64>,
        scale: Option<f64>,
    ) -> Result<Self, PlacementError> {
        let default = Self::default();
        Self::new(
            x.unwrap_or(default.x),
            y.unwrap_or(default.y),
            scale.unwrap_or(default.scale),
        )
    }

    /// Re-validate a placement that arrived through deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError`] if any component is invalid.
    pub fn validated(self) -> Result<Self, PlacementError> {
        Self::new(self.x, self.y, self.scale)
    }
}
