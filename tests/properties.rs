use proptest::{collection::vec, num, prelude::*};
use savedstate::{
    Header, SavedState, Value, deserialize,
    serializers::{BinarySerializer, TextSerializer},
    serialize,
};

/// Text encodings write every `NaN` the same way, so only binary round trips get them.
fn leaf_value(with_nan: bool) -> BoxedStrategy<Value> {
    let (double, float) = if with_nan {
        (num::f64::ANY, num::f32::ANY)
    } else {
        (
            num::f64::POSITIVE | num::f64::NEGATIVE | num::f64::NORMAL | num::f64::SUBNORMAL | num::f64::ZERO | num::f64::INFINITE,
            num::f32::POSITIVE | num::f32::NEGATIVE | num::f32::NORMAL | num::f32::SUBNORMAL | num::f32::ZERO | num::f32::INFINITE,
        )
    };

    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<char>().prop_map(Value::Char),
        double.prop_map(Value::Double),
        float.prop_map(Value::Float),
        any::<i32>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::Long),
        ".*".prop_map(Value::String),
        vec(any::<i32>(), 0..8).prop_map(Value::IntList),
        vec(".*", 0..4).prop_map(Value::StringList),
        vec(any::<bool>(), 0..8).prop_map(|values| Value::BooleanArray(values.into())),
        vec(any::<char>(), 0..8).prop_map(|values| Value::CharArray(values.into())),
        vec(double, 0..8).prop_map(|values| Value::DoubleArray(values.into())),
        vec(float, 0..8).prop_map(|values| Value::FloatArray(values.into())),
        vec(any::<i32>(), 0..8).prop_map(|values| Value::IntArray(values.into())),
        vec(any::<i64>(), 0..8).prop_map(|values| Value::LongArray(values.into())),
        vec(".*", 0..4).prop_map(|values| Value::StringArray(values.into())),
    ]
    .boxed()
}

fn state_with(entries: Vec<(String, Value)>) -> SavedState {
    entries.into_iter().collect()
}

fn saved_state(with_nan: bool) -> impl Strategy<Value = SavedState> {
    let leaf = vec(("[a-z]{1,6}", leaf_value(with_nan)), 0..6).prop_map(state_with);

    leaf.prop_recursive(3, 24, 4, move |inner| {
        vec(("[a-z]{1,6}", prop_oneof![leaf_value(with_nan), inner.prop_map(Value::SavedState)]), 0..4).prop_map(state_with)
    })
}

proptest! {
    #[test]
    fn deep_equality_is_reflexive(state in saved_state(true)) {
        prop_assert!(state.content_deep_equals(&state));
        prop_assert!(state.content_deep_equals(&state.deep_copy()));
    }

    #[test]
    fn deep_equality_is_symmetric(left in saved_state(true), right in saved_state(true)) {
        prop_assert_eq!(left.content_deep_equals(&right), right.content_deep_equals(&left));
    }

    #[test]
    fn map_view_has_one_entry_per_key(state in saved_state(true)) {
        let reader = state.reader();
        prop_assert_eq!(reader.to_map().len(), reader.size());
        prop_assert_eq!(reader.is_empty(), reader.size() == 0);
    }

    #[test]
    fn binary_round_trip(state in saved_state(true)) {
        let mut buffer = Vec::new();
        serialize::<BinarySerializer>(&mut buffer, &Header::default(), &state).unwrap();
        let (decoded, _) = deserialize(&mut buffer.as_slice()).unwrap();
        prop_assert!(decoded.content_deep_equals(&state));
    }

    #[test]
    fn text_round_trip(state in saved_state(false)) {
        let mut buffer = Vec::new();
        serialize::<TextSerializer>(&mut buffer, &Header::default(), &state).unwrap();
        let (decoded, _) = deserialize(&mut buffer.as_slice()).unwrap();
        prop_assert!(decoded.content_deep_equals(&state));
    }
}
