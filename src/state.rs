use std::{
    cell::RefCell,
    collections::HashSet,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

use indexmap::{IndexMap, IndexSet};

use crate::{SavedStateReader, SavedStateWriter, Value};

/// The saved state struct is a handle to an ordered set of keyed values.
///
/// Cloning a saved state clones the handle, not the content. Two handles are equal when they point to the same state.
/// Use [SavedState::content_deep_equals] to compare content.
///
/// A saved state can hold other saved states, but never itself, directly or through its children.
#[derive(Clone)]
pub struct SavedState(Rc<RefCell<StateData>>);

impl Default for SavedState {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SavedState {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SavedState {}

impl std::hash::Hash for SavedState {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl Debug for SavedState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().entries.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SavedState {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let entries = iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self(Rc::new(RefCell::new(StateData { entries })))
    }
}

impl SavedState {
    /// The deepest nesting the serializers read or write. A state without nested states has a depth of one.
    pub const MAX_NESTING_DEPTH: usize = 256;

    /// Creates a new empty saved state.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(StateData { entries: IndexMap::new() })))
    }

    /// Creates a new empty saved state with room for the given number of entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Rc::new(RefCell::new(StateData {
            entries: IndexMap::with_capacity(capacity),
        })))
    }

    /// Returns a reader over this state.
    ///
    /// # Panics
    ///
    /// Panics if a writer for this state is alive.
    pub fn reader(&self) -> SavedStateReader<'_> {
        SavedStateReader::new(self.0.borrow())
    }

    /// Runs the block with a reader over this state and returns its result.
    pub fn read<T>(&self, block: impl FnOnce(&SavedStateReader<'_>) -> T) -> T {
        block(&self.reader())
    }

    /// Returns a writer for this state.
    ///
    /// # Panics
    ///
    /// Panics if a reader or another writer for this state is alive.
    pub fn writer(&self) -> SavedStateWriter<'_> {
        SavedStateWriter::new(self, self.0.borrow_mut())
    }

    /// Runs the block with a writer for this state and returns its result.
    pub fn write<T>(&self, block: impl FnOnce(&mut SavedStateWriter<'_>) -> T) -> T {
        block(&mut self.writer())
    }

    /// Returns a new state with the same entries. Nested states are shared with this one.
    pub fn shallow_copy(&self) -> Self {
        let entries = self.0.borrow().entries.clone();
        Self(Rc::new(RefCell::new(StateData { entries })))
    }

    /// Returns a new state where every nested state is copied as well.
    ///
    /// A state held under several keys is copied once, and the copies share it the same way.
    pub fn deep_copy(&self) -> Self {
        let originals = self.collect_states();
        let copies: Vec<SavedState> = originals.iter().map(|_| SavedState::new()).collect();

        for (original, copy) in originals.iter().zip(&copies) {
            let entries = original
                .0
                .borrow()
                .entries
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::SavedState(nested) => match originals.get_index_of(nested) {
                            Some(index) => Value::SavedState(copies[index].clone()),
                            None => value.clone(),
                        },
                        other => other.clone(),
                    };
                    (key.clone(), value)
                })
                .collect();
            copy.0.borrow_mut().entries = entries;
        }

        copies.into_iter().next().unwrap_or_default()
    }

    /// Checks if the two states are deeply equal.
    ///
    /// They are deeply equal if they have the same size and values at corresponding keys are deeply equal.
    /// Nested states are compared the same way.
    pub fn content_deep_equals(&self, other: &SavedState) -> bool {
        if self == other {
            return true;
        }

        self.0.borrow().content_deep_equals(&other.0.borrow())
    }

    /// Returns this state and every state nested in it, each once. This state comes first.
    pub(crate) fn collect_states(&self) -> IndexSet<SavedState> {
        let mut states = IndexSet::new();
        let mut pending = vec![self.clone()];

        while let Some(state) = pending.pop() {
            if states.contains(&state) {
                continue;
            }

            // Reversed so nested states come out in key order.
            pending.extend(state.0.borrow().nested_states().rev());
            states.insert(state);
        }

        states
    }

    /// Checks if the given state can be reached from this one, including this state itself.
    ///
    /// The target itself is never borrowed, so it may be held by a writer.
    pub(crate) fn reaches(&self, target: &SavedState) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![self.clone()];

        while let Some(state) = pending.pop() {
            if &state == target {
                return true;
            }

            if visited.insert(Rc::as_ptr(&state.0)) {
                pending.extend(state.0.borrow().nested_states());
            }
        }

        false
    }
}

#[derive(Debug)]
pub(crate) struct StateData {
    pub(crate) entries: IndexMap<String, Value>,
}

impl StateData {
    fn nested_states(&self) -> impl DoubleEndedIterator<Item = SavedState> + '_ {
        self.entries.values().filter_map(|value| match value {
            Value::SavedState(nested) => Some(nested.clone()),
            _ => None,
        })
    }

    /// Compares the entries deeply. Each pair of nested states is compared once, however many keys lead to it.
    pub(crate) fn content_deep_equals(&self, other: &StateData) -> bool {
        let mut compared = HashSet::new();
        let mut pending = Vec::new();

        if !self.shallow_equals(other, &mut pending) {
            return false;
        }

        while let Some((left, right)) = pending.pop() {
            if left == right || !compared.insert((Rc::as_ptr(&left.0), Rc::as_ptr(&right.0))) {
                continue;
            }

            if !left.0.borrow().shallow_equals(&right.0.borrow(), &mut pending) {
                return false;
            }
        }

        true
    }

    /// Compares the entries one level deep, queueing nested state pairs instead of comparing them.
    fn shallow_equals(&self, other: &StateData, pending: &mut Vec<(SavedState, SavedState)>) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(key, value)| match (value, other.entries.get(key)) {
                (Value::SavedState(left), Some(Value::SavedState(right))) => {
                    pending.push((left.clone(), right.clone()));
                    true
                }
                (value, Some(other_value)) => value.content_deep_equals(other_value),
                (_, None) => false,
            })
    }
}

impl Drop for StateData {
    // Long chains of nested states would otherwise be dropped recursively.
    fn drop(&mut self) {
        let mut pending: Vec<SavedState> = self.nested_states().collect();
        self.entries.clear();

        while let Some(state) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(state.0) {
                let mut state_data = cell.into_inner();
                pending.extend(state_data.nested_states());
                state_data.entries.clear();
            }
        }
    }
}

/// Creates a [SavedState] from `key => value` pairs.
///
/// ```
/// use savedstate::saved_state;
///
/// let state = saved_state! {
///     "count" => 3,
///     "title" => "Inbox",
/// };
/// assert_eq!(state.reader().get_int("count").unwrap(), 3);
/// ```
#[macro_export]
macro_rules! saved_state {
    () => {
        $crate::SavedState::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        <$crate::SavedState as ::std::iter::FromIterator<(::std::string::String, $crate::Value)>>::from_iter([
            $((::std::string::String::from($key), $crate::Value::from($value))),+
        ])
    };
}
