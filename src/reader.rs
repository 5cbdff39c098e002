use std::{
    cell::Ref,
    collections::HashMap,
};

use thiserror::Error as ThisError;

use crate::{SavedState, Value, ValueKind, state::StateData};

/// Returned by the strict getters of [SavedStateReader] when a key is missing, null, or holds another kind.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("No valid saved state was found for the key '{key}'. It may be missing, null, or not of the expected type ({expected}).")]
pub struct MissingValueError {
    key: String,
    expected: ValueKind,
}

impl MissingValueError {
    fn new(key: &str, expected: ValueKind) -> Self {
        Self {
            key: key.to_string(),
            expected,
        }
    }

    /// Returns the key that was looked up.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the kind the getter expected.
    pub fn expected(&self) -> ValueKind {
        self.expected
    }
}

/// Typed read access to a [SavedState].
///
/// Every kind has a strict getter, which fails with [MissingValueError], and an `_or_else` getter,
/// which falls back to a default. The default closure only runs when the value can't be returned.
pub struct SavedStateReader<'a> {
    source: Ref<'a, StateData>,
}

macro_rules! declare_getters {
    ($($get:ident, $get_or_else:ident, $value:ident, $qualifier:ty;)+) => {
        $(
            #[doc = concat!("Returns the `", stringify!($qualifier), "` value of the key.")]
            pub fn $get(&self, key: impl AsRef<str>) -> Result<$qualifier, MissingValueError> {
                let key = key.as_ref();
                match self.source.entries.get(key) {
                    Some(Value::$value(value)) => Ok(value.clone()),
                    _ => Err(MissingValueError::new(key, ValueKind::$value)),
                }
            }

            #[doc = concat!("Returns the `", stringify!($qualifier), "` value of the key, or the result of `default_value` if there is none.")]
            pub fn $get_or_else(&self, key: impl AsRef<str>, default_value: impl FnOnce() -> $qualifier) -> $qualifier {
                match self.source.entries.get(key.as_ref()) {
                    Some(Value::$value(value)) => value.clone(),
                    _ => default_value(),
                }
            }
        )+
    };
}

impl<'a> SavedStateReader<'a> {
    pub(crate) fn new(source: Ref<'a, StateData>) -> Self {
        Self { source }
    }

    declare_getters! {
        get_boolean, get_boolean_or_else, Boolean, bool;
        get_char, get_char_or_else, Char, char;
        get_double, get_double_or_else, Double, f64;
        get_float, get_float_or_else, Float, f32;
        get_int, get_int_or_else, Int, i32;
        get_long, get_long_or_else, Long, i64;
        get_string, get_string_or_else, String, String;
        get_int_list, get_int_list_or_else, IntList, Vec<i32>;
        get_string_list, get_string_list_or_else, StringList, Vec<String>;
        get_boolean_array, get_boolean_array_or_else, BooleanArray, Box<[bool]>;
        get_char_array, get_char_array_or_else, CharArray, Box<[char]>;
        get_double_array, get_double_array_or_else, DoubleArray, Box<[f64]>;
        get_float_array, get_float_array_or_else, FloatArray, Box<[f32]>;
        get_int_array, get_int_array_or_else, IntArray, Box<[i32]>;
        get_long_array, get_long_array_or_else, LongArray, Box<[i64]>;
        get_string_array, get_string_array_or_else, StringArray, Box<[String]>;
        get_saved_state, get_saved_state_or_else, SavedState, SavedState;
    }

    /// Returns the value of the key. If the key does not exist, returns None.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&Value> {
        self.source.entries.get(key.as_ref())
    }

    /// Returns the value of the key. If the key does not exist or is not the same type, returns None.
    pub fn get_value<V>(&self, key: impl AsRef<str>) -> Option<&V>
    where
        for<'v> &'v V: TryFrom<&'v Value>,
    {
        self.source.entries.get(key.as_ref()).and_then(|value| value.try_into().ok())
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.source.entries.keys().map(String::as_str)
    }

    /// Returns the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.source.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the number of entries.
    pub fn size(&self) -> usize {
        self.source.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.entries.is_empty()
    }

    /// Checks if the key holds an explicit null. A missing key is not null.
    pub fn is_null(&self, key: impl AsRef<str>) -> bool {
        matches!(self.source.entries.get(key.as_ref()), Some(Value::Null))
    }

    /// Checks if the key exists, null or not.
    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.source.entries.contains_key(key.as_ref())
    }

    /// Checks if the read state is deeply equal to the other state.
    ///
    /// See [SavedState::content_deep_equals].
    pub fn content_deep_equals(&self, other: &SavedState) -> bool {
        let other_data = other.reader();

        if std::ptr::eq(&*self.source, &*other_data.source) {
            return true;
        }

        self.source.content_deep_equals(&other_data.source)
    }

    /// Returns the entries as a map, without their order.
    ///
    /// Values are cloned one level deep. Nested states are shared with this state, not converted.
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.source.entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
    }
}
