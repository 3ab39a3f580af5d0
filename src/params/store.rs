//! Parameter store — ordered, composite-keyed registry of every learned
//! quantity.
//!
//! Purpose
//! -------
//! Hold the model's closed parameter set: one [`ParamQuantity`] per
//! [`ParamKey`], in a `BTreeMap` so θ packing, persistence, and iteration
//! are deterministic. The store is built once by walking the IRF tree at
//! model construction and never grows afterwards.
//!
//! Key behaviors
//! -------------
//! - θ round-trip: [`ParamStore::to_theta`] packs every tensor (locations
//!   first, then raw scales, per quantity in key order) into one
//!   unconstrained vector; [`ParamStore::assign_theta`] writes a vector of
//!   exactly that length back.
//! - Persistence: [`ParamStore::entries`] flattens the store into a list
//!   of `(key, [group], values)` records; [`ParamStore::load_entries`]
//!   writes matching records back into an already-built store. Structure
//!   (widths, bounds, random terms) always comes from configuration, never
//!   from the persisted file.
//! - Realization: [`ParamStore::realize`] snapshots every quantity for one
//!   forward pass, applying mean-centering to random terms.
use crate::params::{
    decomp::{ParamQuantity, Realize, RealizedQuantity, Regime},
    errors::{ParamError, ParamResult},
    key::ParamKey,
};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One persisted record: a quantity's fixed part (`group: None`) or one
/// random term (`group: Some(factor)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub key: ParamKey,
    pub group: Option<String>,
    /// Row-major location values, `rows × cols`.
    pub loc: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    /// Raw scales under the distributional regime.
    pub raw_scale: Option<Vec<f64>>,
}

/// Ordered registry of the model's learned quantities.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamStore {
    regime: Regime,
    quantities: BTreeMap<ParamKey, ParamQuantity>,
}

impl ParamStore {
    /// Empty store under the given estimation regime.
    pub fn new(regime: Regime) -> Self {
        ParamStore { regime, quantities: BTreeMap::new() }
    }

    /// Estimation regime shared by every quantity.
    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Insert a quantity.
    ///
    /// # Errors
    /// [`ParamError::DuplicateKey`] when the key is already present.
    pub fn insert(&mut self, key: ParamKey, quantity: ParamQuantity) -> ParamResult<()> {
        if self.quantities.contains_key(&key) {
            return Err(ParamError::DuplicateKey { key: key.to_string() });
        }
        self.quantities.insert(key, quantity);
        Ok(())
    }

    /// Look up a quantity.
    pub fn get(&self, key: &ParamKey) -> Option<&ParamQuantity> {
        self.quantities.get(key)
    }

    /// Look up a quantity, failing with [`ParamError::MissingQuantity`].
    pub fn expect(&self, key: &ParamKey) -> ParamResult<&ParamQuantity> {
        self.quantities
            .get(key)
            .ok_or_else(|| ParamError::MissingQuantity { key: key.to_string() })
    }

    /// Iterate quantities in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &ParamQuantity)> {
        self.quantities.iter()
    }

    /// Number of quantities.
    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    /// Whether the store holds no quantities.
    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Packed θ length across all tensors.
    pub fn theta_len(&self) -> usize {
        self.quantities.values().map(ParamQuantity::n_packed).sum()
    }

    /// Pack every tensor into one unconstrained θ vector, in key order.
    pub fn to_theta(&self) -> Array1<f64> {
        let mut theta = Vec::with_capacity(self.theta_len());
        for quantity in self.quantities.values() {
            pack_tensor(&mut theta, &quantity.fixed);
            for term in &quantity.random {
                pack_tensor(&mut theta, &term.tensor);
            }
        }
        Array1::from(theta)
    }

    /// Write a θ vector back into the store.
    ///
    /// # Errors
    /// - [`ParamError::ThetaLengthMismatch`] on a wrong-length vector.
    /// - [`ParamError::NonFiniteValue`] at the first non-finite entry,
    ///   reported against the receiving quantity.
    pub fn assign_theta(&mut self, theta: ArrayView1<'_, f64>) -> ParamResult<()> {
        let expected = self.theta_len();
        if theta.len() != expected {
            return Err(ParamError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        let mut offset = 0;
        for (key, quantity) in self.quantities.iter_mut() {
            let take = quantity.n_packed();
            let slice = theta.slice(ndarray::s![offset..offset + take]);
            if let Some(pos) = slice.iter().position(|v| !v.is_finite()) {
                return Err(ParamError::NonFiniteValue {
                    key: key.to_string(),
                    index: pos,
                    value: slice[pos],
                });
            }
            let mut cursor = 0;
            unpack_tensor(&slice, &mut cursor, &mut quantity.fixed);
            for term in &mut quantity.random {
                unpack_tensor(&slice, &mut cursor, &mut term.tensor);
            }
            offset += take;
        }
        Ok(())
    }

    /// Total KL penalty of the store under its regime; zero for the point
    /// regime.
    pub fn penalty(&self) -> f64 {
        match self.regime {
            Regime::Point => 0.0,
            Regime::Distributional { prior_sd } => {
                self.quantities.values().map(|q| q.kl_penalty(prior_sd)).sum()
            }
        }
    }

    /// Snapshot every quantity for one forward pass.
    pub fn realize(&self, mode: &mut Realize<'_>) -> BTreeMap<ParamKey, RealizedQuantity> {
        self.quantities.iter().map(|(k, q)| (k.clone(), q.realize(mode))).collect()
    }

    /// Flatten the store into persistable records.
    pub fn entries(&self) -> Vec<ParamEntry> {
        let mut out = Vec::new();
        for (key, quantity) in &self.quantities {
            out.push(ParamEntry {
                key: key.clone(),
                group: None,
                loc: quantity.fixed.loc.iter().copied().collect(),
                rows: quantity.fixed.loc.nrows(),
                cols: quantity.fixed.loc.ncols(),
                raw_scale: quantity.fixed.raw_scale.as_ref().map(|s| s.iter().copied().collect()),
            });
            for term in &quantity.random {
                out.push(ParamEntry {
                    key: key.clone(),
                    group: Some(term.factor.clone()),
                    loc: term.tensor.loc.iter().copied().collect(),
                    rows: term.tensor.loc.nrows(),
                    cols: term.tensor.loc.ncols(),
                    raw_scale: term
                        .tensor
                        .raw_scale
                        .as_ref()
                        .map(|s| s.iter().copied().collect()),
                });
            }
        }
        out
    }

    /// Load persisted records into a structurally matching store.
    ///
    /// # Errors
    /// - [`ParamError::MissingQuantity`] for a record whose key the store
    ///   does not declare.
    /// - [`ParamError::UnknownFactor`] for a record naming a random term
    ///   the quantity does not carry.
    /// - [`ParamError::LengthMismatch`] / [`ParamError::NonFiniteValue`]
    ///   for malformed value vectors.
    pub fn load_entries(&mut self, entries: &[ParamEntry]) -> ParamResult<()> {
        for entry in entries {
            let key_display = entry.key.to_string();
            let quantity = self
                .quantities
                .get_mut(&entry.key)
                .ok_or_else(|| ParamError::MissingQuantity { key: key_display.clone() })?;
            let tensor = match &entry.group {
                None => &mut quantity.fixed,
                Some(factor) => {
                    &mut quantity
                        .random
                        .iter_mut()
                        .find(|t| t.factor == *factor)
                        .ok_or_else(|| ParamError::UnknownFactor {
                            key: key_display.clone(),
                            factor: factor.clone(),
                        })?
                        .tensor
                }
            };
            if entry.loc.len() != tensor.loc.len()
                || entry.rows != tensor.loc.nrows()
                || entry.cols != tensor.loc.ncols()
            {
                return Err(ParamError::LengthMismatch {
                    key: key_display,
                    expected: tensor.loc.len(),
                    actual: entry.loc.len(),
                });
            }
            if let Some(pos) = entry.loc.iter().position(|v| !v.is_finite()) {
                return Err(ParamError::NonFiniteValue {
                    key: key_display,
                    index: pos,
                    value: entry.loc[pos],
                });
            }
            for (dst, &src) in tensor.loc.iter_mut().zip(&entry.loc) {
                *dst = src;
            }
            if let (Some(dst), Some(src)) = (&mut tensor.raw_scale, &entry.raw_scale) {
                if src.len() != dst.len() {
                    return Err(ParamError::LengthMismatch {
                        key: entry.key.to_string(),
                        expected: dst.len(),
                        actual: src.len(),
                    });
                }
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = s;
                }
            }
        }
        Ok(())
    }
}

fn pack_tensor(theta: &mut Vec<f64>, tensor: &crate::params::decomp::ParamTensor) {
    theta.extend(tensor.loc.iter().copied());
    if let Some(raw_scale) = &tensor.raw_scale {
        theta.extend(raw_scale.iter().copied());
    }
}

fn unpack_tensor(
    slice: &ArrayView1<'_, f64>, cursor: &mut usize,
    tensor: &mut crate::params::decomp::ParamTensor,
) {
    for dst in tensor.loc.iter_mut() {
        *dst = slice[*cursor];
        *cursor += 1;
    }
    if let Some(raw_scale) = &mut tensor.raw_scale {
        for dst in raw_scale.iter_mut() {
            *dst = slice[*cursor];
            *cursor += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::bounds::BoundType;
    use approx::assert_relative_eq;

    fn store_with_two_quantities(regime: Regime) -> ParamStore {
        let mut store = ParamStore::new(regime);
        store
            .insert(
                ParamKey::intercept("rt"),
                ParamQuantity::from_constrained(
                    "intercept/rt",
                    &[0.3, 1.0],
                    vec![BoundType::Free, BoundType::Lower { min: 0.0 }],
                    regime,
                )
                .unwrap(),
            )
            .unwrap();
        store
            .insert(
                ParamKey::coefficient("rt", "c1"),
                ParamQuantity::from_constrained(
                    "coefficient/rt/c1",
                    &[0.7],
                    vec![BoundType::Free],
                    regime,
                )
                .unwrap()
                .with_random("subject", 3, regime),
            )
            .unwrap();
        store
    }

    #[test]
    // Purpose
    // -------
    // θ packing round-trips: to_theta → assign_theta reproduces the store
    // exactly, and perturbed values land where they were packed from.
    fn theta_round_trips() {
        let mut store = store_with_two_quantities(Regime::Point);
        let theta = store.to_theta();
        assert_eq!(theta.len(), store.theta_len());

        let mut perturbed = theta.clone();
        perturbed[0] += 0.25;
        store.assign_theta(perturbed.view()).unwrap();
        let packed = store.to_theta();
        assert_relative_eq!(packed[0], theta[0] + 0.25);
        assert_eq!(packed.len(), theta.len());
    }

    #[test]
    fn assign_theta_rejects_wrong_length_and_non_finite() {
        let mut store = store_with_two_quantities(Regime::Point);
        let short = Array1::zeros(store.theta_len() - 1);
        assert!(matches!(
            store.assign_theta(short.view()),
            Err(ParamError::ThetaLengthMismatch { .. })
        ));

        let mut bad = store.to_theta();
        bad[1] = f64::NAN;
        assert!(matches!(
            store.assign_theta(bad.view()),
            Err(ParamError::NonFiniteValue { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Entries round-trip through serde into a structurally matching
    // store, under both regimes.
    fn entries_round_trip_through_serde() {
        for regime in [Regime::Point, Regime::Distributional { prior_sd: 1.0 }] {
            let mut source = store_with_two_quantities(regime);
            let mut theta = source.to_theta();
            theta.mapv_inplace(|v| v + 0.1);
            source.assign_theta(theta.view()).unwrap();

            let json = serde_json::to_string(&source.entries()).unwrap();
            let entries: Vec<ParamEntry> = serde_json::from_str(&json).unwrap();

            let mut target = store_with_two_quantities(regime);
            target.load_entries(&entries).unwrap();
            assert_eq!(target.to_theta(), source.to_theta());
        }
    }

    #[test]
    fn load_entries_rejects_unknown_keys() {
        let mut store = store_with_two_quantities(Regime::Point);
        let entry = ParamEntry {
            key: ParamKey::intercept("unknown"),
            group: None,
            loc: vec![0.0],
            rows: 1,
            cols: 1,
            raw_scale: None,
        };
        assert!(matches!(
            store.load_entries(&[entry]),
            Err(ParamError::MissingQuantity { .. })
        ));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = store_with_two_quantities(Regime::Point);
        let result = store.insert(
            ParamKey::intercept("rt"),
            ParamQuantity::from_constrained(
                "intercept/rt",
                &[0.0],
                vec![BoundType::Free],
                Regime::Point,
            )
            .unwrap(),
        );
        assert!(matches!(result, Err(ParamError::DuplicateKey { .. })));
    }

    #[test]
    fn penalty_is_zero_for_point_regime_only() {
        let point = store_with_two_quantities(Regime::Point);
        assert_eq!(point.penalty(), 0.0);

        let dist = store_with_two_quantities(Regime::Distributional { prior_sd: 1.0 });
        assert!(dist.penalty() > 0.0);
    }
}
