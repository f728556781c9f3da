//! Named parameter storage for unrolled networks.
//!
//! Parameters live in a two-level structure: a [`ParameterStore`] maps group
//! names (`layer-{id}`, `prox`) to [`ParameterGroup`]s, and each group holds
//! named tensors plus tagged nested sub-groups (a per-layer proximal network
//! stores its own `layer-{id}` groups one level down). Nesting is explicit
//! rather than encoded in string-prefixed keys, so no key parsing happens at
//! forward time.
//!
//! Training flattens a chosen set of groups into one `Vec<f64>` through a
//! [`ParamLayout`], and re-lifts the optimizer's iterate into a store of any
//! [`Scalar`] type — tape-recorded values during gradient evaluation, plain
//! floats when writing the result back.

use std::collections::BTreeMap;

use crate::error::LpgdError;
use crate::linalg::Mat;
use crate::scalar::Scalar;

/// Named tensors plus tagged nested sub-groups.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterGroup<T> {
    tensors: BTreeMap<String, Mat<T>>,
    subgroups: BTreeMap<String, ParameterGroup<T>>,
}

impl<T: Scalar> ParameterGroup<T> {
    pub fn new() -> Self {
        ParameterGroup {
            tensors: BTreeMap::new(),
            subgroups: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Mat<T>) {
        self.tensors.insert(name.into(), value);
    }

    /// Insert a scalar parameter as a 1x1 tensor.
    pub fn insert_scalar(&mut self, name: impl Into<String>, value: T) {
        self.insert(name, Mat::from_vec(1, 1, vec![value]));
    }

    pub fn insert_subgroup(&mut self, name: impl Into<String>, group: ParameterGroup<T>) {
        self.subgroups.insert(name.into(), group);
    }

    pub fn tensor(&self, name: &str) -> Option<&Mat<T>> {
        self.tensors.get(name)
    }

    /// Read a 1x1 tensor back as a scalar.
    pub fn scalar(&self, name: &str) -> Option<T> {
        self.tensors.get(name).map(|m| m.get(0, 0))
    }

    pub fn subgroup(&self, name: &str) -> Option<&ParameterGroup<T>> {
        self.subgroups.get(name)
    }

    pub fn tensors(&self) -> impl Iterator<Item = (&str, &Mat<T>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn subgroups(&self) -> impl Iterator<Item = (&str, &ParameterGroup<T>)> {
        self.subgroups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// View the sub-groups as a free-standing store, dropping any tensors
    /// held directly by this group.
    pub fn to_store(&self) -> ParameterStore<T> {
        ParameterStore {
            groups: self.subgroups.clone(),
        }
    }

    /// Total number of scalar values, including nested sub-groups.
    pub fn num_values(&self) -> usize {
        let own: usize = self
            .tensors
            .values()
            .map(|m| m.rows() * m.cols())
            .sum();
        own + self.subgroups.values().map(Self::num_values).sum::<usize>()
    }
}

impl ParameterGroup<f64> {
    /// Lift every tensor to constants of another scalar type.
    pub fn lift<T: Scalar<Float = f64>>(&self) -> ParameterGroup<T> {
        ParameterGroup {
            tensors: self
                .tensors
                .iter()
                .map(|(k, v)| (k.clone(), v.lift()))
                .collect(),
            subgroups: self
                .subgroups
                .iter()
                .map(|(k, v)| (k.clone(), v.lift()))
                .collect(),
        }
    }
}

/// Top-level parameter storage keyed by group name.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterStore<T> {
    groups: BTreeMap<String, ParameterGroup<T>>,
}

impl<T: Scalar> ParameterStore<T> {
    pub fn new() -> Self {
        ParameterStore {
            groups: BTreeMap::new(),
        }
    }

    pub fn insert_group(&mut self, name: impl Into<String>, group: ParameterGroup<T>) {
        self.groups.insert(name.into(), group);
    }

    pub fn group(&self, name: &str) -> Option<&ParameterGroup<T>> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ParameterGroup<T>> {
        self.groups.get_mut(name)
    }

    pub fn remove_group(&mut self, name: &str) -> Option<ParameterGroup<T>> {
        self.groups.remove(name)
    }

    /// Embed the whole store as the sub-groups of a single group.
    pub fn to_group(&self) -> ParameterGroup<T> {
        ParameterGroup {
            tensors: BTreeMap::new(),
            subgroups: self.groups.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &ParameterGroup<T>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn tensor_at_path(&self, path: &str) -> Option<&Mat<T>> {
        let mut parts: Vec<&str> = path.split('/').collect();
        let tensor_name = parts.pop()?;
        let mut iter = parts.into_iter();
        let mut group = self.groups.get(iter.next()?)?;
        for part in iter {
            group = group.subgroups.get(part)?;
        }
        group.tensors.get(tensor_name)
    }

    fn tensor_at_path_mut(&mut self, path: &str) -> Option<&mut Mat<T>> {
        let mut parts: Vec<&str> = path.split('/').collect();
        let tensor_name = parts.pop()?;
        let mut iter = parts.into_iter();
        let mut group = self.groups.get_mut(iter.next()?)?;
        for part in iter {
            group = group.subgroups.get_mut(part)?;
        }
        group.tensors.get_mut(tensor_name)
    }
}

impl ParameterStore<f64> {
    /// Lift the whole store to constants of another scalar type.
    pub fn lift<T: Scalar<Float = f64>>(&self) -> ParameterStore<T> {
        ParameterStore {
            groups: self
                .groups
                .iter()
                .map(|(k, v)| (k.clone(), v.lift()))
                .collect(),
        }
    }

    /// Copy the tensors a layout covers into one flat vector.
    pub fn flatten(&self, layout: &ParamLayout) -> Vec<f64> {
        let mut theta = vec![0.0; layout.len()];
        for entry in layout.entries() {
            let tensor = self
                .tensor_at_path(&entry.path)
                .expect("layout path refers to a stored tensor");
            theta[entry.offset..entry.offset + tensor.data().len()]
                .copy_from_slice(tensor.data());
        }
        theta
    }

    /// Write a flat iterate back into the tensors a layout covers.
    pub fn assign(&mut self, layout: &ParamLayout, theta: &[f64]) {
        assert_eq!(theta.len(), layout.len(), "iterate length mismatch");
        for entry in layout.entries() {
            let tensor = self
                .tensor_at_path_mut(&entry.path)
                .expect("layout path refers to a stored tensor");
            let len = tensor.data().len();
            tensor
                .data_mut()
                .copy_from_slice(&theta[entry.offset..entry.offset + len]);
        }
    }

    /// Lift the store with the layout-covered tensors replaced by the given
    /// scalar values (typically tape-registered variables) and everything
    /// else lifted as constants.
    pub fn lift_with<T: Scalar<Float = f64>>(
        &self,
        layout: &ParamLayout,
        values: &[T],
    ) -> ParameterStore<T> {
        assert_eq!(values.len(), layout.len(), "iterate length mismatch");
        let mut lifted = self.lift::<T>();
        for entry in layout.entries() {
            let tensor = lifted
                .tensor_at_path_mut(&entry.path)
                .expect("layout path refers to a stored tensor");
            let len = tensor.data().len();
            tensor
                .data_mut()
                .copy_from_slice(&values[entry.offset..entry.offset + len]);
        }
        lifted
    }
}

/// Location of one tensor inside a flattened trainable vector.
#[derive(Clone, Debug)]
pub struct LayoutEntry {
    pub path: String,
    pub rows: usize,
    pub cols: usize,
    pub offset: usize,
}

/// Flattening order for a chosen set of parameter groups: depth-first over
/// each group, tensors before sub-groups, everything in key order.
#[derive(Clone, Debug, Default)]
pub struct ParamLayout {
    entries: Vec<LayoutEntry>,
    total: usize,
}

impl ParamLayout {
    pub fn for_groups(store: &ParameterStore<f64>, group_names: &[String]) -> ParamLayout {
        let mut names: Vec<&String> = group_names.iter().collect();
        names.sort();
        names.dedup();
        let mut layout = ParamLayout::default();
        for name in names {
            if let Some(group) = store.group(name) {
                layout.push_group(name, group);
            }
        }
        layout
    }

    fn push_group(&mut self, prefix: &str, group: &ParameterGroup<f64>) {
        for (name, tensor) in group.tensors() {
            self.entries.push(LayoutEntry {
                path: format!("{prefix}/{name}"),
                rows: tensor.rows(),
                cols: tensor.cols(),
                offset: self.total,
            });
            self.total += tensor.rows() * tensor.cols();
        }
        for (name, sub) in group.subgroups() {
            self.push_group(&format!("{prefix}/{name}"), sub);
        }
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Validate an initial-parameter override against the default group it
/// replaces: it must define exactly the same tensors (and nested groups)
/// with the same shapes.
pub(crate) fn validated_override(
    group_name: &str,
    defaults: &ParameterGroup<f64>,
    replacement: &ParameterGroup<f64>,
) -> Result<ParameterGroup<f64>, LpgdError> {
    for (name, tensor) in replacement.tensors() {
        match defaults.tensor(name) {
            None => {
                return Err(LpgdError::UnknownParameter {
                    group: group_name.to_string(),
                    name: name.to_string(),
                })
            }
            Some(expected) if expected.shape() != tensor.shape() => {
                return Err(LpgdError::ShapeMismatch {
                    name: format!("{group_name}/{name}"),
                    expected_rows: expected.rows(),
                    expected_cols: expected.cols(),
                    got_rows: tensor.rows(),
                    got_cols: tensor.cols(),
                });
            }
            Some(_) => {}
        }
    }
    for (name, _) in defaults.tensors() {
        if replacement.tensor(name).is_none() {
            return Err(LpgdError::UnknownParameter {
                group: group_name.to_string(),
                name: name.to_string(),
            });
        }
    }

    let mut validated = ParameterGroup::new();
    for (name, tensor) in replacement.tensors() {
        validated.insert(name, tensor.clone());
    }
    for (name, default_sub) in defaults.subgroups() {
        let sub_path = format!("{group_name}/{name}");
        match replacement.subgroup(name) {
            Some(replacement_sub) => {
                validated.insert_subgroup(
                    name,
                    validated_override(&sub_path, default_sub, replacement_sub)?,
                );
            }
            None => {
                return Err(LpgdError::UnknownParameter {
                    group: group_name.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }
    for (name, _) in replacement.subgroups() {
        if defaults.subgroup(name).is_none() {
            return Err(LpgdError::UnknownParameter {
                group: group_name.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ParameterStore<f64> {
        let mut store = ParameterStore::new();
        for layer_id in 0..2 {
            let mut g = ParameterGroup::new();
            g.insert(
                "Wu",
                Mat::from_rows(vec![
                    vec![1.0 + layer_id as f64, 0.0],
                    vec![0.0, 1.0],
                ]),
            );
            g.insert_scalar("threshold", 0.25);
            store.insert_group(format!("layer-{layer_id}"), g);
        }
        store
    }

    #[test]
    fn flatten_assign_round_trip() {
        let mut store = sample_store();
        let names: Vec<String> = vec!["layer-0".into(), "layer-1".into()];
        let layout = ParamLayout::for_groups(&store, &names);
        assert_eq!(layout.len(), 10);

        let mut theta = store.flatten(&layout);
        theta[0] += 3.0;
        store.assign(&layout, &theta);
        assert_eq!(store.flatten(&layout), theta);
        // First layout entry is layer-0/Wu, row-major.
        assert_eq!(store.group("layer-0").unwrap().tensor("Wu").unwrap().get(0, 0), 4.0);
    }

    #[test]
    fn layout_covers_nested_subgroups() {
        let mut store = ParameterStore::new();
        let mut inner = ParameterGroup::new();
        inner.insert_scalar("threshold", 0.5);
        let mut g = ParameterGroup::new();
        g.insert_scalar("sigma", 0.5);
        g.insert_subgroup("prox", inner);
        store.insert_group("layer-0", g);

        let layout = ParamLayout::for_groups(&store, &["layer-0".to_string()]);
        assert_eq!(layout.len(), 2);
        let paths: Vec<&str> = layout.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["layer-0/sigma", "layer-0/prox/threshold"]);
    }

    #[test]
    fn lift_with_replaces_covered_tensors() {
        let store = sample_store();
        let layout = ParamLayout::for_groups(&store, &["layer-1".to_string()]);
        let values: Vec<f64> = (0..layout.len()).map(|i| i as f64).collect();
        let lifted: ParameterStore<f64> = store.lift_with(&layout, &values);
        // layer-0 untouched, layer-1 overwritten in layout order.
        assert_eq!(lifted.group("layer-0").unwrap().scalar("threshold"), Some(0.25));
        assert_eq!(lifted.group("layer-1").unwrap().tensor("Wu").unwrap().get(0, 0), 0.0);
        assert_eq!(lifted.group("layer-1").unwrap().scalar("threshold"), Some(4.0));
    }

    #[test]
    fn override_validation_rejects_shape_and_name_mismatches() {
        let mut defaults = ParameterGroup::new();
        defaults.insert("Wu", Mat::<f64>::eye(2));

        let mut bad_shape = ParameterGroup::new();
        bad_shape.insert("Wu", Mat::<f64>::eye(3));
        assert!(matches!(
            validated_override("layer-0", &defaults, &bad_shape),
            Err(LpgdError::ShapeMismatch { .. })
        ));

        let mut bad_name = ParameterGroup::new();
        bad_name.insert("Wz", Mat::<f64>::eye(2));
        assert!(matches!(
            validated_override("layer-0", &defaults, &bad_name),
            Err(LpgdError::UnknownParameter { .. })
        ));

        let mut good = ParameterGroup::new();
        good.insert("Wu", Mat::<f64>::eye(2).scale(2.0));
        let validated = validated_override("layer-0", &defaults, &good).unwrap();
        assert_eq!(validated.tensor("Wu").unwrap().get(1, 1), 2.0);
    }
}
