use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::SavedState;

/// A single value stored under a key of a [SavedState].
///
/// Sequences are growable [Vec]s, fixed-size arrays are boxed slices. The two are distinct kinds.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Char(char),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    String(String),
    SavedState(SavedState),
    IntList(Vec<i32>),
    StringList(Vec<String>),
    BooleanArray(Box<[bool]>),
    CharArray(Box<[char]>),
    DoubleArray(Box<[f64]>),
    FloatArray(Box<[f32]>),
    IntArray(Box<[i32]>),
    LongArray(Box<[i64]>),
    StringArray(Box<[String]>),
}

/// The kind of a [Value], without its data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Null = 0,
    Boolean = 1,
    Char = 2,
    Double = 3,
    Float = 4,
    Int = 5,
    Long = 6,
    String = 7,
    SavedState = 8,
    IntList = 9,
    StringList = 10,
    BooleanArray = 11,
    CharArray = 12,
    DoubleArray = 13,
    FloatArray = 14,
    IntArray = 15,
    LongArray = 16,
    StringArray = 17,
}

impl ValueKind {
    pub const ALL: [ValueKind; 18] = [
        ValueKind::Null,
        ValueKind::Boolean,
        ValueKind::Char,
        ValueKind::Double,
        ValueKind::Float,
        ValueKind::Int,
        ValueKind::Long,
        ValueKind::String,
        ValueKind::SavedState,
        ValueKind::IntList,
        ValueKind::StringList,
        ValueKind::BooleanArray,
        ValueKind::CharArray,
        ValueKind::DoubleArray,
        ValueKind::FloatArray,
        ValueKind::IntArray,
        ValueKind::LongArray,
        ValueKind::StringArray,
    ];

    /// Returns the tag used for this kind in binary encodings.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns the kind for a binary tag. If the tag is unknown, returns None.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Returns the name used for this kind in text encodings and messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "bool",
            ValueKind::Char => "char",
            ValueKind::Double => "double",
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::String => "string",
            ValueKind::SavedState => "saved_state",
            ValueKind::IntList => "int_list",
            ValueKind::StringList => "string_list",
            ValueKind::BooleanArray => "bool_array",
            ValueKind::CharArray => "char_array",
            ValueKind::DoubleArray => "double_array",
            ValueKind::FloatArray => "float_array",
            ValueKind::IntArray => "int_array",
            ValueKind::LongArray => "long_array",
            ValueKind::StringArray => "string_array",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.name() == name).ok_or(())
    }
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Char(_) => ValueKind::Char,
            Value::Double(_) => ValueKind::Double,
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::String(_) => ValueKind::String,
            Value::SavedState(_) => ValueKind::SavedState,
            Value::IntList(_) => ValueKind::IntList,
            Value::StringList(_) => ValueKind::StringList,
            Value::BooleanArray(_) => ValueKind::BooleanArray,
            Value::CharArray(_) => ValueKind::CharArray,
            Value::DoubleArray(_) => ValueKind::DoubleArray,
            Value::FloatArray(_) => ValueKind::FloatArray,
            Value::IntArray(_) => ValueKind::IntArray,
            Value::LongArray(_) => ValueKind::LongArray,
            Value::StringArray(_) => ValueKind::StringArray,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compares two values deeply.
    ///
    /// Nested states are compared by content, arrays and sequences element by element.
    /// Floating point values compare by bit pattern, so `NaN` equals itself.
    pub fn content_deep_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Char(left), Value::Char(right)) => left == right,
            (Value::Double(left), Value::Double(right)) => left.to_bits() == right.to_bits(),
            (Value::Float(left), Value::Float(right)) => left.to_bits() == right.to_bits(),
            (Value::Int(left), Value::Int(right)) => left == right,
            (Value::Long(left), Value::Long(right)) => left == right,
            (Value::String(left), Value::String(right)) => left == right,
            (Value::SavedState(left), Value::SavedState(right)) => left.content_deep_equals(right),
            (Value::IntList(left), Value::IntList(right)) => left == right,
            (Value::StringList(left), Value::StringList(right)) => left == right,
            (Value::BooleanArray(left), Value::BooleanArray(right)) => left == right,
            (Value::CharArray(left), Value::CharArray(right)) => left == right,
            (Value::DoubleArray(left), Value::DoubleArray(right)) => {
                left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| l.to_bits() == r.to_bits())
            }
            (Value::FloatArray(left), Value::FloatArray(right)) => {
                left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| l.to_bits() == r.to_bits())
            }
            (Value::IntArray(left), Value::IntArray(right)) => left == right,
            (Value::LongArray(left), Value::LongArray(right)) => left == right,
            (Value::StringArray(left), Value::StringArray(right)) => left == right,
            _ => false,
        }
    }
}

macro_rules! declare_value {
    ($qualifier:ty, $value:path) => {
        impl From<$qualifier> for Value {
            fn from(value: $qualifier) -> Self {
                $value(value)
            }
        }

        impl TryFrom<Value> for $qualifier {
            type Error = Value;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $value(value) => Ok(value),
                    other => Err(other),
                }
            }
        }

        impl<'a> TryFrom<&'a Value> for &'a $qualifier {
            type Error = ValueKind;

            fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
                match value {
                    $value(value) => Ok(value),
                    other => Err(other.kind()),
                }
            }
        }
    };
}

declare_value!(bool, Value::Boolean);
declare_value!(char, Value::Char);
declare_value!(f64, Value::Double);
declare_value!(f32, Value::Float);
declare_value!(i32, Value::Int);
declare_value!(i64, Value::Long);
declare_value!(String, Value::String);
declare_value!(SavedState, Value::SavedState);
declare_value!(Vec<i32>, Value::IntList);
declare_value!(Vec<String>, Value::StringList);
declare_value!(Box<[bool]>, Value::BooleanArray);
declare_value!(Box<[char]>, Value::CharArray);
declare_value!(Box<[f64]>, Value::DoubleArray);
declare_value!(Box<[f32]>, Value::FloatArray);
declare_value!(Box<[i32]>, Value::IntArray);
declare_value!(Box<[i64]>, Value::LongArray);
declare_value!(Box<[String]>, Value::StringArray);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_deeply_equal_to_itself() {
        let value = Value::Double(f64::NAN);
        assert!(value.content_deep_equals(&value.clone()));

        let array = Value::FloatArray(Box::new([1.0, f32::NAN]));
        assert!(array.content_deep_equals(&array.clone()));
    }

    #[test]
    fn signed_zeros_differ() {
        assert!(!Value::Double(0.0).content_deep_equals(&Value::Double(-0.0)));
    }

    #[test]
    fn sequence_and_array_are_different_kinds() {
        let list = Value::IntList(vec![1, 2, 3]);
        let array = Value::IntArray(Box::new([1, 2, 3]));
        assert!(!list.content_deep_equals(&array));
    }

    #[test]
    fn kind_tags_and_names_resolve_back() {
        for kind in ValueKind::ALL {
            assert_eq!(ValueKind::from_tag(kind.tag()), Some(kind));
            assert_eq!(kind.name().parse::<ValueKind>(), Ok(kind));
        }
        assert_eq!(ValueKind::from_tag(200), None);
    }
}
