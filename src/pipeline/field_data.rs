//! Named `f64` arrays attached to data objects.
//!
//! Array storage is reference counted so a shallow copy shares buffers and a
//! write through [`DataArray::values_mut`] only clones when the buffer is
//! actually shared.

use std::sync::Arc;

/// A named array of values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    name: String,
    values: Arc<Vec<f64>>,
}

impl DataArray {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(values),
        }
    }

    /// An array of `len` copies of `value`.
    pub fn filled(name: impl Into<String>, len: usize, value: f64) -> Self {
        Self::new(name, vec![value; len])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<f64> {
        Arc::make_mut(&mut self.values)
    }

    /// A copy that owns its own buffer.
    pub fn deep_copy(&self) -> Self {
        Self::new(self.name.clone(), self.values.as_ref().clone())
    }

    pub fn shares_storage_with(&self, other: &DataArray) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    pub fn memory_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }
}

/// Collection of arrays not tied to points or cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldData {
    arrays: Vec<DataArray>,
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an array, replacing any existing array with the same name.
    pub fn add_array(&mut self, array: DataArray) {
        match self.arrays.iter_mut().find(|a| a.name == array.name) {
            Some(existing) => *existing = array,
            None => self.arrays.push(array),
        }
    }

    pub fn array(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn remove_array(&mut self, name: &str) -> Option<DataArray> {
        let pos = self.arrays.iter().position(|a| a.name == name)?;
        Some(self.arrays.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }

    pub fn clear(&mut self) {
        self.arrays.clear();
    }

    /// Copy every array of `other` into `self` (buffers are shared).
    pub fn pass_data(&mut self, other: &FieldData) {
        for array in &other.arrays {
            self.add_array(array.clone());
        }
    }

    pub fn deep_copy(&self) -> Self {
        Self {
            arrays: self.arrays.iter().map(DataArray::deep_copy).collect(),
        }
    }

    pub fn memory_size(&self) -> usize {
        self.arrays.iter().map(DataArray::memory_size).sum()
    }
}
