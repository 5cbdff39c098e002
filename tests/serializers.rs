use std::io::{BufReader, Cursor};

use savedstate::{
    Header, SavedState, SerializationError, Serializer, deserialize, read_file,
    serializers::{BinarySerializationError, BinarySerializer, TextSerializationError, TextSerializer},
    saved_state, serialize, write_file,
};

fn sample_state() -> SavedState {
    let scroll = saved_state! {
        "first_visible_item" => 12,
        "offset" => 3.5f32,
    };

    let state = saved_state! {
        "title" => "Inbox \"unread\"\n\tfiltered",
        "selected" => true,
        "initial" => 'é',
        "ratio" => -0.0f64,
        "visits" => 1_000_000_000_000i64,
        "deleted" => Option::<i32>::None,
        "scroll" => scroll,
        "ids" => vec![3, 1, 2],
        "labels" => vec![String::from("work"), String::from("")],
    };

    state.write(|writer| {
        writer.put_boolean_array("flags", [true, false, true]);
        writer.put_char_array("letters", ['a', '\u{1F600}']);
        writer.put_double_array("weights", [f64::INFINITY, 0.1]);
        writer.put_float_array("empty_floats", Vec::<f32>::new());
        writer.put_int_array("counts", [i32::MIN, i32::MAX]);
        writer.put_long_array("stamps", [0i64, -1]);
        writer.put_string_array("names", vec![String::from("a\\b"), String::from("c,d")]);
    });

    state
}

fn round_trip<S: Serializer>(state: &SavedState) -> (SavedState, Header) {
    let mut buffer = Vec::new();
    serialize::<S>(&mut buffer, &Header::default(), state).unwrap();
    deserialize(&mut BufReader::new(Cursor::new(buffer))).unwrap()
}

#[test]
fn binary_round_trip_keeps_content() {
    let state = sample_state();
    let (decoded, header) = round_trip::<BinarySerializer>(&state);

    assert_eq!(header, Header::default());
    assert!(decoded.content_deep_equals(&state));

    let keys: Vec<String> = decoded.reader().keys().map(String::from).collect();
    let original_keys: Vec<String> = state.reader().keys().map(String::from).collect();
    assert_eq!(keys, original_keys);
}

#[test]
fn text_round_trip_keeps_content() {
    let state = sample_state();
    let (decoded, header) = round_trip::<TextSerializer>(&state);

    assert_eq!(header, Header::default());
    assert!(decoded.content_deep_equals(&state));
}

#[test]
fn binary_keeps_shared_states_shared() {
    let shared = saved_state! { "value" => 1 };
    let root = saved_state! { "left" => shared.clone(), "right" => shared };

    let (decoded, _) = round_trip::<BinarySerializer>(&root);
    let reader = decoded.reader();
    assert_eq!(reader.get_saved_state("left").unwrap(), reader.get_saved_state("right").unwrap());
}

#[test]
fn text_duplicates_shared_states() {
    let shared = saved_state! { "value" => 1 };
    let root = saved_state! { "left" => shared.clone(), "right" => shared };

    let (decoded, _) = round_trip::<TextSerializer>(&root);
    let reader = decoded.reader();
    let (left, right) = (reader.get_saved_state("left").unwrap(), reader.get_saved_state("right").unwrap());
    assert_ne!(left, right);
    assert!(left.content_deep_equals(&right));
}

#[test]
fn text_encoding_is_readable() {
    let state = saved_state! {
        "count" => 3,
        "tags" => vec![String::from("a"), String::from("b")],
        "child" => saved_state! { "on" => true },
        "gone" => Option::<i32>::None,
    };

    let mut buffer = Vec::new();
    serialize::<TextSerializer>(&mut buffer, &Header::new("screen", 2), &state).unwrap();

    let expected = "<!-- savedstate encoding text 1 format screen 2 -->\n\
                    {\n\
                    \t\"count\" \"int\" \"3\"\n\
                    \t\"tags\" \"string_list\"\n\
                    \t[\n\
                    \t\t\"a\",\n\
                    \t\t\"b\"\n\
                    \t]\n\
                    \t\"child\" \"saved_state\"\n\
                    \t{\n\
                    \t\t\"on\" \"bool\" \"true\"\n\
                    \t}\n\
                    \t\"gone\" \"null\"\n\
                    }\n";
    assert_eq!(String::from_utf8(buffer).unwrap(), expected);
}

#[test]
fn text_accepts_comments_and_trailing_commas() {
    let text = "<!-- savedstate encoding text 1 format savedstate 1 -->\n\
                // saved by hand\n\
                {\n\
                \"ids\" \"int_array\" [ \"1\", \"2\", ]\n\
                \"enabled\" \"bool\" \"1\" // legacy spelling\n\
                }\n";

    let (state, _) = deserialize(&mut text.as_bytes()).unwrap();
    let reader = state.reader();
    assert_eq!(&*reader.get_int_array("ids").unwrap(), &[1, 2]);
    assert!(reader.get_boolean("enabled").unwrap());
}

#[test]
fn text_errors_report_lines() {
    let text = "<!-- savedstate encoding text 1 format savedstate 1 -->\n{\n\"count\" \"int\" \"three\"\n}\n";
    let error = deserialize(&mut text.as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::Text(TextSerializationError::FailedToParseInteger(3))));

    let text = "<!-- savedstate encoding text 1 format savedstate 1 -->\n{\n\"count\" \"number\" \"3\"\n}\n";
    let error = deserialize(&mut text.as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::Text(TextSerializationError::UnknownValueType(_, 3))));

    let text = "<!-- savedstate encoding text 1 format savedstate 1 -->\n{\n\"count\" \"int\" \"3\"\n";
    let error = deserialize(&mut text.as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::Text(TextSerializationError::UnexpectedEnd)));

    let text = "<!-- savedstate encoding text 1 format savedstate 1 -->\n{\n}\n{\n}\n";
    let error = deserialize(&mut text.as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::Text(TextSerializationError::InvalidToken(4))));
}

fn nested_text(depth: usize) -> String {
    let mut text = String::from("<!-- savedstate encoding text 1 format savedstate 1 -->\n{\n");
    for _ in 1..depth {
        text.push_str("\"child\" \"saved_state\" {\n");
    }
    for _ in 0..depth {
        text.push_str("}\n");
    }
    text
}

#[test]
fn text_rejects_deep_nesting() {
    let (state, _) = deserialize(&mut nested_text(SavedState::MAX_NESTING_DEPTH).as_bytes()).unwrap();
    assert!(state.reader().contains("child"));

    for depth in [SavedState::MAX_NESTING_DEPTH + 1, 300] {
        let error = deserialize(&mut nested_text(depth).as_bytes()).unwrap_err();
        assert!(matches!(error, SerializationError::Text(TextSerializationError::NestingTooDeep(_))));
    }
}

#[test]
fn header_parsing() {
    let (header, encoding, version) = Header::parse("<!-- savedstate encoding binary 1 format screen 4 -->\n").unwrap();
    assert_eq!(header, Header::new("screen", 4));
    assert_eq!(encoding, "binary");
    assert_eq!(version, 1);

    assert!(matches!(Header::parse("<!-- appstate encoding binary 1 format appstate 1 -->"), Err(SerializationError::InvalidHeader)));
    assert!(matches!(Header::parse("savedstate"), Err(SerializationError::InvalidHeader)));
}

#[test]
fn unknown_encoding_and_bad_headers_are_rejected() {
    let error = deserialize(&mut "<!-- savedstate encoding xml 1 format savedstate 1 -->\n".as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::UnknownEncoding(encoding) if encoding == "xml"));

    let error = deserialize(&mut "no header here".as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::InvalidHeader));

    let long_line = "x".repeat(Header::MAX_HEADER_LENGTH * 2);
    let error = deserialize(&mut long_line.as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::HeaderTooLong(_)));

    let error = deserialize(&mut "<!-- savedstate encoding binary 9 format savedstate 1 -->\n".as_bytes()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::InvalidEncodingVersion)));
}

fn binary_document(body: &[u8]) -> Vec<u8> {
    let mut document = Header::default().create_header("binary", 1).into_bytes();
    document.push(0);
    document.extend_from_slice(body);
    document
}

fn int(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

#[test]
fn binary_rejects_cyclic_states() {
    // One string ("self"), one state holding itself under "self".
    let mut body = Vec::new();
    body.extend(int(1));
    body.extend(int(4));
    body.extend(b"self");
    body.extend(int(1));
    body.extend(int(1));
    body.extend(int(0));
    body.push(8);
    body.extend(int(0));

    let error = deserialize(&mut binary_document(&body).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::CyclicState(key)) if key == "self"));
}

/// A table where every state but the last one holds the next one under each key.
fn linked_states(keys: &[&str], states: usize) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(int(keys.len() as i32));
    for key in keys {
        body.extend(int(key.len() as i32));
        body.extend(key.as_bytes());
    }

    body.extend(int(states as i32));
    for index in 0..states - 1 {
        body.extend(int(keys.len() as i32));
        for key_index in 0..keys.len() {
            body.extend(int(key_index as i32));
            body.push(8);
            body.extend(int(index as i32 + 1));
        }
    }
    body.extend(int(0));
    body
}

fn nesting_depth(state: &SavedState) -> usize {
    let mut depth = 1;
    let mut current = state.clone();
    loop {
        let next = current.reader().get_saved_state("child");
        match next {
            Ok(next) => current = next,
            Err(_) => return depth,
        }
        depth += 1;
    }
}

#[test]
fn binary_decodes_shared_diamonds() {
    let document = binary_document(&linked_states(&["left", "right"], 65));
    let (root, _) = deserialize(&mut document.as_slice()).unwrap();

    let reader = root.reader();
    let (left, right) = (reader.get_saved_state("left").unwrap(), reader.get_saved_state("right").unwrap());
    assert_eq!(left, right);

    let mut buffer = Vec::new();
    serialize::<BinarySerializer>(&mut buffer, &Header::default(), &root).unwrap();
    assert_eq!(buffer, document);
}

#[test]
fn binary_limits_nesting_depth() {
    let document = binary_document(&linked_states(&["child"], SavedState::MAX_NESTING_DEPTH));
    let (root, _) = deserialize(&mut document.as_slice()).unwrap();
    assert_eq!(nesting_depth(&root), SavedState::MAX_NESTING_DEPTH);

    let document = binary_document(&linked_states(&["child"], SavedState::MAX_NESTING_DEPTH + 1));
    let error = deserialize(&mut document.as_slice()).unwrap_err();
    assert!(matches!(
        error,
        SerializationError::Binary(BinarySerializationError::NestingTooDeep(depth)) if depth == SavedState::MAX_NESTING_DEPTH
    ));
}

#[test]
fn serializers_refuse_to_write_deep_nesting() {
    let mut state = SavedState::new();
    for _ in 1..SavedState::MAX_NESTING_DEPTH {
        state = saved_state! { "child" => state };
    }

    let mut buffer = Vec::new();
    serialize::<BinarySerializer>(&mut buffer, &Header::default(), &state).unwrap();
    let mut buffer = Vec::new();
    serialize::<TextSerializer>(&mut buffer, &Header::default(), &state).unwrap();
    let (decoded, _) = deserialize(&mut buffer.as_slice()).unwrap();
    assert_eq!(nesting_depth(&decoded), SavedState::MAX_NESTING_DEPTH);

    let state = saved_state! { "child" => state };
    let result = serialize::<BinarySerializer>(&mut Vec::new(), &Header::default(), &state);
    assert!(matches!(result, Err(BinarySerializationError::NestingTooDeep(_))));
    let result = serialize::<TextSerializer>(&mut Vec::new(), &Header::default(), &state);
    assert!(matches!(result, Err(TextSerializationError::NestingTooDeep(_))));
}

#[test]
fn serializers_reject_unreadable_formats() {
    assert!(Header::default().is_valid());
    assert!(Header::new("x".repeat(Header::MAX_FORMAT_LENGTH), 1).is_valid());

    let state = saved_state! { "count" => 1 };
    for header in [Header::new("", 1), Header::new("two words", 1), Header::new("x".repeat(Header::MAX_FORMAT_LENGTH + 1), 1)] {
        assert!(!header.is_valid());

        let mut buffer = Vec::new();
        let result = serialize::<BinarySerializer>(&mut buffer, &header, &state);
        assert!(matches!(result, Err(BinarySerializationError::InvalidHeader)));
        let result = serialize::<TextSerializer>(&mut buffer, &header, &state);
        assert!(matches!(result, Err(TextSerializationError::InvalidHeader)));
        assert!(buffer.is_empty());
    }
}

#[test]
fn binary_rejects_malformed_data() {
    let error = deserialize(&mut binary_document(&[]).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::UnexpectedEnd)));

    let mut no_states = Vec::new();
    no_states.extend(int(0));
    no_states.extend(int(0));
    let error = deserialize(&mut binary_document(&no_states).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::MissingRoot)));

    let mut bad_tag = Vec::new();
    bad_tag.extend(int(1));
    bad_tag.extend(int(1));
    bad_tag.extend(b"k");
    bad_tag.extend(int(1));
    bad_tag.extend(int(1));
    bad_tag.extend(int(0));
    bad_tag.push(99);
    let error = deserialize(&mut binary_document(&bad_tag).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::InvalidValueType(99))));

    let mut bad_string = Vec::new();
    bad_string.extend(int(0));
    bad_string.extend(int(1));
    bad_string.extend(int(1));
    bad_string.extend(int(5));
    let error = deserialize(&mut binary_document(&bad_string).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::InvalidStringIndex)));

    let mut negative_length = Vec::new();
    negative_length.extend(int(-1));
    let error = deserialize(&mut binary_document(&negative_length).as_slice()).unwrap_err();
    assert!(matches!(error, SerializationError::Binary(BinarySerializationError::InvalidLength)));
}

#[test]
fn binary_serializer_checks_its_encoding() {
    let result = BinarySerializer::deserialize(&mut "".as_bytes(), String::from("text"), 1);
    assert!(matches!(result, Err(BinarySerializationError::WrongEncoding)));

    let result = TextSerializer::deserialize(&mut "{}".as_bytes(), String::from("binary"), 1);
    assert!(matches!(result, Err(TextSerializationError::WrongEncoding)));
}

#[test]
fn files_round_trip() {
    let directory = tempfile::tempdir().unwrap();
    let state = sample_state();

    let binary_path = directory.path().join("state.bin");
    write_file::<BinarySerializer>(&binary_path, &Header::default(), &state).unwrap();
    let (decoded, _) = read_file(&binary_path).unwrap();
    assert!(decoded.content_deep_equals(&state));

    let text_path = directory.path().join("state.txt");
    write_file::<TextSerializer>(&text_path, &Header::new("dump", 3), &state).unwrap();
    let (decoded, header) = read_file(&text_path).unwrap();
    assert!(decoded.content_deep_equals(&state));
    assert_eq!(header, Header::new("dump", 3));

    let error = read_file(directory.path().join("missing.bin")).unwrap_err();
    assert!(matches!(error, SerializationError::Io(_)));
}
