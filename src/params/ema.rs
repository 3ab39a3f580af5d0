//! Exponential-moving-average tracking of the packed parameter vector.
//!
//! A non-correctness-critical side-channel: between optimizer steps the
//! model may feed each θ iterate into an [`EmaTracker`], and reporting
//! code can read the smoothed snapshot instead of the raw iterate. Nothing
//! in the forward pass depends on this state.
use crate::params::errors::{ParamError, ParamResult};
use ndarray::{Array1, ArrayView1};

/// Exponentially weighted average of θ snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaTracker {
    decay: f64,
    shadow: Option<Array1<f64>>,
}

impl EmaTracker {
    /// Construct a tracker with the given decay.
    ///
    /// # Errors
    /// [`ParamError::InvalidDecay`] unless `0 < decay < 1`.
    pub fn new(decay: f64) -> ParamResult<Self> {
        if !decay.is_finite() || decay <= 0.0 || decay >= 1.0 {
            return Err(ParamError::InvalidDecay { value: decay });
        }
        Ok(EmaTracker { decay, shadow: None })
    }

    /// Fold one θ snapshot into the average. The first snapshot seeds the
    /// shadow directly.
    pub fn update(&mut self, theta: ArrayView1<'_, f64>) {
        match &mut self.shadow {
            None => self.shadow = Some(theta.to_owned()),
            Some(shadow) => {
                let decay = self.decay;
                shadow.zip_mut_with(&theta, |s, &t| *s = decay * *s + (1.0 - decay) * t);
            }
        }
    }

    /// Current smoothed snapshot, if any update has happened.
    pub fn shadow(&self) -> Option<&Array1<f64>> {
        self.shadow.as_ref()
    }
}
