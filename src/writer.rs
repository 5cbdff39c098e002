use std::cell::RefMut;

use thiserror::Error as ThisError;

use crate::{SavedState, Value, state::StateData};

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum WriteError {
    #[error("Nesting A State Under Key '{key}' Would Make It Contain Itself")]
    CyclicNesting { key: String },
}

/// Typed write access to a [SavedState].
///
/// Writing a key that already exists replaces its value and keeps its position.
pub struct SavedStateWriter<'a> {
    target: &'a SavedState,
    source: RefMut<'a, StateData>,
}

macro_rules! declare_putters {
    ($($put:ident, $value:ident, $qualifier:ty;)+) => {
        $(
            #[doc = concat!("Sets the key to a `", stringify!($qualifier), "` value.")]
            pub fn $put(&mut self, key: impl Into<String>, value: impl Into<$qualifier>) {
                self.source.entries.insert(key.into(), Value::$value(value.into()));
            }
        )+
    };
}

impl<'a> SavedStateWriter<'a> {
    pub(crate) fn new(target: &'a SavedState, source: RefMut<'a, StateData>) -> Self {
        Self { target, source }
    }

    declare_putters! {
        put_boolean, Boolean, bool;
        put_char, Char, char;
        put_double, Double, f64;
        put_float, Float, f32;
        put_int, Int, i32;
        put_long, Long, i64;
        put_string, String, String;
        put_int_list, IntList, Vec<i32>;
        put_string_list, StringList, Vec<String>;
        put_boolean_array, BooleanArray, Box<[bool]>;
        put_char_array, CharArray, Box<[char]>;
        put_double_array, DoubleArray, Box<[f64]>;
        put_float_array, FloatArray, Box<[f32]>;
        put_int_array, IntArray, Box<[i32]>;
        put_long_array, LongArray, Box<[i64]>;
        put_string_array, StringArray, Box<[String]>;
    }

    /// Sets the key to an explicit null.
    pub fn put_null(&mut self, key: impl Into<String>) {
        self.source.entries.insert(key.into(), Value::Null);
    }

    /// Nests a state under the key.
    ///
    /// Fails if the nested state is the written state or contains it.
    pub fn put_saved_state(&mut self, key: impl Into<String>, value: SavedState) -> Result<(), WriteError> {
        self.put(key, value)
    }

    /// Sets the key to any value. Nested states are checked like in [SavedStateWriter::put_saved_state].
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), WriteError> {
        let key = key.into();
        let value = value.into();

        if let Value::SavedState(nested) = &value {
            if nested.reaches(self.target) {
                log::warn!("Refusing to nest a state under '{}', it would contain itself", key);
                return Err(WriteError::CyclicNesting { key });
            }
        }

        self.source.entries.insert(key, value);
        Ok(())
    }

    /// Copies every entry of the other state into this one, replacing existing keys.
    ///
    /// Nothing is copied if any nested state would make this state contain itself.
    /// Copying a state into itself does nothing.
    pub fn put_all(&mut self, from: &SavedState) -> Result<(), WriteError> {
        if from == self.target {
            return Ok(());
        }

        let from_reader = from.reader();
        let cyclic_key = from_reader.iter().find_map(|(key, value)| match value {
            Value::SavedState(nested) if nested.reaches(self.target) => Some(key),
            _ => None,
        });

        if let Some(key) = cyclic_key {
            log::warn!("Refusing to copy a state holding this one under '{}'", key);
            return Err(WriteError::CyclicNesting { key: key.to_string() });
        }

        self.source
            .entries
            .extend(from_reader.iter().map(|(key, value)| (key.to_string(), value.clone())));
        Ok(())
    }

    /// Sets the key without checking for cycles. The value must not be able to reach the written state.
    pub(crate) fn put_unchecked(&mut self, key: String, value: Value) {
        self.source.entries.insert(key, value);
    }

    /// Removes the key and returns its value. If the key does not exist, returns None.
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<Value> {
        self.source.entries.shift_remove(key.as_ref())
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.source.entries.clear();
    }

    /// Reserves capacity for at least additional more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.source.entries.reserve(additional);
    }
}
