//! function::core::state — call counters, caches, histories, parameters.
//!
//! Purpose
//! -------
//! Hold the mutable bookkeeping that sits next to otherwise immutable
//! function definitions: call counters, the evaluation cache, the call
//! history, the parameter vector with its description, and the optional
//! input/output descriptions.
//!
//! Key behaviors
//! -------------
//! - [`EvaluationState`] is owned by every evaluation. All mutation goes
//!   through `&self` so evaluations can be shared behind `Arc` and evaluated
//!   from rayon workers.
//! - [`DerivativeState`] is the lighter variant owned by gradients and
//!   Hessians: a call counter and a parameter vector.
//! - [`EvaluationCache`] maps exact input bit patterns to outputs, counts
//!   hits, and evicts in insertion order once `max_size` is reached.
//! - [`History`] is an append-only log of computed input/output pairs.
//!
//! Invariants & assumptions
//! ------------------------
//! - Cache and history are independent toggles; toggling never discards
//!   stored entries, only `clear_*` does.
//! - Cache hits do not touch the call counter or the history.
//! - Replacing the parameter vector clears the cache, since cached outputs
//!   were computed under the previous parameters.
//! - Single-writer discipline: concurrent toggling or parameter updates
//!   from several threads are memory-safe but their interleaving is
//!   unspecified.
//!
//! Conventions
//! -----------
//! - Poisoned locks are recovered with `PoisonError::into_inner`; the
//!   bookkeeping holds plain data that stays consistent across a panic.
use crate::function::{
    core::{
        description::{Description, PARAMETER_PREFIX},
        options::{DEFAULT_CACHE_MAX_SIZE, DEFAULT_PARAMETER_EPSILON, FunctionOptions},
        sample::Sample,
        types::Point,
    },
    errors::{FunctionError, FunctionResult},
};
use ndarray::ArrayView1;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

/// Cache mapping exact input bit patterns to outputs.
#[derive(Debug, Clone)]
pub struct EvaluationCache {
    enabled: bool,
    max_size: usize,
    entries: HashMap<Vec<u64>, Point>,
    order: VecDeque<Vec<u64>>,
    hits: usize,
}

impl EvaluationCache {
    pub fn new(max_size: usize) -> Self {
        EvaluationCache {
            enabled: false,
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
        }
    }

    fn key(x: ArrayView1<'_, f64>) -> Vec<u64> {
        x.iter().map(|v| v.to_bits()).collect()
    }

    /// Look `x` up; counts a hit on success. Disabled caches always miss.
    pub fn lookup(&mut self, x: ArrayView1<'_, f64>) -> Option<Point> {
        if !self.enabled {
            return None;
        }
        let found = self.entries.get(&Self::key(x)).cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    /// Store `x ↦ y`, evicting the oldest entry when full.
    pub fn insert(&mut self, x: ArrayView1<'_, f64>, y: &Point) {
        if !self.enabled {
            return;
        }
        let key = Self::key(x);
        if self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, y.clone());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Shrinking the capacity evicts the oldest entries.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        while self.entries.len() > self.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Append-only log of computed input/output pairs.
#[derive(Debug, Clone, Default)]
pub struct History {
    enabled: bool,
    inputs: Vec<Point>,
    outputs: Vec<Point>,
}

impl History {
    pub fn record(&mut self, x: ArrayView1<'_, f64>, y: &Point) {
        if self.enabled {
            self.inputs.push(x.to_owned());
            self.outputs.push(y.clone());
        }
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Parameter vector, its names, and the forward-difference step used by the
/// default parameter gradient.
#[derive(Debug, Clone)]
struct ParameterSet {
    values: Point,
    description: Option<Description>,
    epsilon: f64,
}

impl ParameterSet {
    fn new(values: Point) -> Self {
        ParameterSet { values, description: None, epsilon: DEFAULT_PARAMETER_EPSILON }
    }

    fn description(&self) -> Description {
        self.description
            .clone()
            .unwrap_or_else(|| Description::build_default(self.values.len(), PARAMETER_PREFIX))
    }
}

/// EvaluationState — bookkeeping owned by every evaluation.
///
/// Fields
/// ------
/// - `calls`: number of computed (non-cached) points.
/// - `cache`: [`EvaluationCache`], disabled by default.
/// - `history`: [`History`], disabled by default.
/// - `parameter`: parameter values, names, and the parameter-gradient step.
/// - `input_description` / `output_description`: explicit names, if set.
#[derive(Debug)]
pub struct EvaluationState {
    calls: AtomicUsize,
    cache: Mutex<EvaluationCache>,
    history: Mutex<History>,
    parameter: RwLock<ParameterSet>,
    input_description: RwLock<Option<Description>>,
    output_description: RwLock<Option<Description>>,
}

impl Default for EvaluationState {
    fn default() -> Self {
        EvaluationState::new(Point::zeros(0))
    }
}

impl EvaluationState {
    /// Fresh state holding `parameter`.
    pub fn new(parameter: Point) -> Self {
        EvaluationState {
            calls: AtomicUsize::new(0),
            cache: Mutex::new(EvaluationCache::new(DEFAULT_CACHE_MAX_SIZE)),
            history: Mutex::new(History::default()),
            parameter: RwLock::new(ParameterSet::new(parameter)),
            input_description: RwLock::new(None),
            output_description: RwLock::new(None),
        }
    }

    /// Adopt the cache capacity and parameter step of `options`.
    pub fn apply_options(&self, options: &FunctionOptions) {
        self.lock_cache().set_max_size(options.cache_max_size);
        self.write_parameter().epsilon = options.parameter_epsilon;
    }

    // ---- Calls ----

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Book one computed pair: counter, history, cache.
    pub fn record(&self, x: ArrayView1<'_, f64>, y: &Point) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.lock_history().record(x, y);
        self.lock_cache().insert(x, y);
    }

    /// Book every row pair of two samples.
    pub fn record_sample(&self, xs: &Sample, ys: &Sample) {
        self.calls.fetch_add(xs.size(), Ordering::Relaxed);
        let mut history = self.lock_history();
        let mut cache = self.lock_cache();
        for (x, y) in xs.rows().zip(ys.rows()) {
            let y = y.to_owned();
            history.record(x, &y);
            cache.insert(x, &y);
        }
    }

    // ---- Cache ----

    pub fn cache_lookup(&self, x: ArrayView1<'_, f64>) -> Option<Point> {
        self.lock_cache().lookup(x)
    }

    pub fn enable_cache(&self) {
        self.lock_cache().set_enabled(true);
    }

    pub fn disable_cache(&self) {
        self.lock_cache().set_enabled(false);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.lock_cache().is_enabled()
    }

    pub fn cache_hits(&self) -> usize {
        self.lock_cache().hits()
    }

    pub fn cache_size(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    // ---- History ----

    pub fn enable_history(&self) {
        self.lock_history().enabled = true;
    }

    pub fn disable_history(&self) {
        self.lock_history().enabled = false;
    }

    pub fn is_history_enabled(&self) -> bool {
        self.lock_history().enabled
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    /// Logged inputs as a `len × input_dimension` sample.
    pub fn history_input(&self, input_dimension: usize) -> FunctionResult<Sample> {
        Sample::from_points(input_dimension, &self.lock_history().inputs)
    }

    /// Logged outputs as a `len × output_dimension` sample.
    pub fn history_output(&self, output_dimension: usize) -> FunctionResult<Sample> {
        Sample::from_points(output_dimension, &self.lock_history().outputs)
    }

    // ---- Parameters ----

    pub fn parameter(&self) -> Point {
        self.read_parameter().values.clone()
    }

    pub fn parameter_dimension(&self) -> usize {
        self.read_parameter().values.len()
    }

    pub fn parameter_epsilon(&self) -> f64 {
        self.read_parameter().epsilon
    }

    /// Replace the parameter values; the dimension may not change.
    ///
    /// Clears the cache.
    pub fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        {
            let mut set = self.write_parameter();
            if set.values.len() != parameter.len() {
                return Err(FunctionError::ParameterDimMismatch {
                    expected: set.values.len(),
                    found: parameter.len(),
                });
            }
            set.values.assign(parameter);
        }
        self.lock_cache().clear();
        Ok(())
    }

    pub fn parameter_description(&self) -> Description {
        self.read_parameter().description()
    }

    pub fn set_parameter_description(&self, description: Description) -> FunctionResult<()> {
        let mut set = self.write_parameter();
        if description.len() != set.values.len() {
            return Err(FunctionError::DescriptionSizeMismatch {
                expected: set.values.len(),
                found: description.len(),
            });
        }
        set.description = Some(description);
        Ok(())
    }

    // ---- Descriptions ----

    pub fn input_description(&self) -> Option<Description> {
        self.input_description.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn output_description(&self) -> Option<Description> {
        self.output_description.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Store input names; callers check the length.
    pub fn store_input_description(&self, description: Description) {
        *self.input_description.write().unwrap_or_else(PoisonError::into_inner) =
            Some(description);
    }

    /// Store output names; callers check the length.
    pub fn store_output_description(&self, description: Description) {
        *self.output_description.write().unwrap_or_else(PoisonError::into_inner) =
            Some(description);
    }

    // ---- Helper methods ----

    fn lock_cache(&self) -> MutexGuard<'_, EvaluationCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_parameter(&self) -> RwLockReadGuard<'_, ParameterSet> {
        self.parameter.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_parameter(&self) -> RwLockWriteGuard<'_, ParameterSet> {
        self.parameter.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// DerivativeState — bookkeeping owned by gradients and Hessians.
#[derive(Debug)]
pub struct DerivativeState {
    calls: AtomicUsize,
    parameter: RwLock<ParameterSet>,
}

impl Default for DerivativeState {
    fn default() -> Self {
        DerivativeState::new(Point::zeros(0))
    }
}

impl DerivativeState {
    pub fn new(parameter: Point) -> Self {
        DerivativeState {
            calls: AtomicUsize::new(0),
            parameter: RwLock::new(ParameterSet::new(parameter)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn increment_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parameter(&self) -> Point {
        self.parameter.read().unwrap_or_else(PoisonError::into_inner).values.clone()
    }

    pub fn set_parameter(&self, parameter: &Point) -> FunctionResult<()> {
        let mut set = self.parameter.write().unwrap_or_else(PoisonError::into_inner);
        if set.values.len() != parameter.len() {
            return Err(FunctionError::ParameterDimMismatch {
                expected: set.values.len(),
                found: parameter.len(),
            });
        }
        set.values.assign(parameter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Cache hit counting, FIFO eviction, and the disabled-cache path.
    // - History recording toggles.
    // - Parameter replacement clearing the cache.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that a full cache evicts its oldest entry first.
    //
    // Given
    // -----
    // - An enabled cache of capacity 2 filled with three distinct keys.
    //
    // Expect
    // ------
    // - The first key misses, the last two hit, and the hit counter is 2.
    fn cache_evicts_oldest_entry_when_full() {
        // Arrange
        let mut cache = EvaluationCache::new(2);
        cache.set_enabled(true);
        let (a, b, c) = (array![1.0], array![2.0], array![3.0]);

        // Act
        cache.insert(a.view(), &array![10.0]);
        cache.insert(b.view(), &array![20.0]);
        cache.insert(c.view(), &array![30.0]);

        // Assert
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(a.view()).is_none());
        assert_eq!(cache.lookup(b.view()), Some(array![20.0]));
        assert_eq!(cache.lookup(c.view()), Some(array![30.0]));
        assert_eq!(cache.hits(), 2);
    }

    #[test]
    // Purpose
    // -------
    // Ensure disabling keeps stored entries and that a disabled cache misses.
    //
    // Given
    // -----
    // - One stored entry, then the cache disabled and re-enabled.
    //
    // Expect
    // ------
    // - Lookups miss while disabled; the entry is served again afterwards.
    fn disabling_cache_keeps_entries() {
        // Arrange
        let state = EvaluationState::default();
        state.enable_cache();
        let x = array![0.5];
        state.record(x.view(), &array![1.0]);

        // Act
        state.disable_cache();
        let while_disabled = state.cache_lookup(x.view());
        state.enable_cache();
        let after = state.cache_lookup(x.view());

        // Assert
        assert!(while_disabled.is_none());
        assert_eq!(after, Some(array![1.0]));
        assert_eq!(state.cache_size(), 1);
        assert_eq!(state.calls(), 1);
    }

    #[test]
    // Purpose
    // -------
    // Check history toggling and sample export.
    //
    // Given
    // -----
    // - One call recorded with history off, two with history on.
    //
    // Expect
    // ------
    // - Only the last two pairs appear, in order.
    fn history_records_only_while_enabled() {
        // Arrange
        let state = EvaluationState::default();

        // Act
        state.record(array![1.0].view(), &array![2.0]);
        state.enable_history();
        state.record(array![3.0].view(), &array![4.0]);
        state.record(array![5.0].view(), &array![6.0]);
        let inputs = state.history_input(1).unwrap();
        let outputs = state.history_output(1).unwrap();

        // Assert
        assert_eq!(inputs.size(), 2);
        assert_eq!(inputs.row(0)[0], 3.0);
        assert_eq!(outputs.row(1)[0], 6.0);
        assert_eq!(state.calls(), 3);
    }

    #[test]
    // Purpose
    // -------
    // Verify that changing parameters clears cached outputs and that the
    // parameter dimension is fixed.
    //
    // Given
    // -----
    // - A state with a 1-D parameter and one cached entry.
    //
    // Expect
    // ------
    // - After `set_parameter` the cache is empty; a 2-D update is rejected.
    fn set_parameter_clears_cache_and_checks_dimension() {
        // Arrange
        let state = EvaluationState::new(array![1.0]);
        state.enable_cache();
        state.record(array![0.0].view(), &array![1.0]);

        // Act
        let ok = state.set_parameter(&array![2.0]);
        let err = state.set_parameter(&array![2.0, 3.0]);

        // Assert
        assert!(ok.is_ok());
        assert_eq!(state.cache_size(), 0);
        assert_eq!(state.parameter(), array![2.0]);
        assert_eq!(err, Err(FunctionError::ParameterDimMismatch { expected: 1, found: 2 }));
        assert_eq!(state.parameter_description().as_slice(), &["p0"]);
    }
}
