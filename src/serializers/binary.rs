use std::io::{BufRead, Error, Read, Write};

use indexmap::IndexSet;
use thiserror::Error as ThisError;

use crate::{Header, SavedState, Serializer, Value, ValueKind};

#[derive(Debug, ThisError)]
pub enum BinarySerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] Error),
    #[error("To Many States To Serialize")]
    TooManyStates,
    #[error("To Many Strings To Serialize")]
    TooManyStrings,
    #[error("String Too Long To Serialize")]
    StringTooLong,
    #[error("Value Array Too Long")]
    ValueArrayTooLong,
    #[error("Header Serializer Version Is Different")]
    InvalidEncodingVersion,
    #[error("Header Serializer Is Different")]
    WrongEncoding,
    #[error("Invalid String Index")]
    InvalidStringIndex,
    #[error("State Index Was Invalid")]
    MissingState,
    #[error("No Root State Was Found")]
    MissingRoot,
    #[error("Negative Length Found")]
    InvalidLength,
    #[error("Value Type Number Not Valid Value: {0}")]
    InvalidValueType(u8),
    #[error("Invalid Character Code: {0}")]
    InvalidCharacter(u32),
    #[error("Unexpected End Of Data")]
    UnexpectedEnd,
    #[error("State Under Key '{0}' Would Contain Itself")]
    CyclicState(String),
    #[error("States Nested Deeper Than {0} Levels")]
    NestingTooDeep(usize),
    #[error("Header Format Is Empty, Too Long Or Contains Whitespace")]
    InvalidHeader,
}

/// The number of array elements reserved up front when reading, whatever length the data claims.
const PREALLOCATION_LIMIT: usize = 1024;

struct BinaryWriter<T: Write> {
    buffer: T,
    string_table: IndexSet<String>,
}

impl<T: Write> BinaryWriter<T> {
    fn new(buffer: T) -> Self {
        Self {
            buffer,
            string_table: IndexSet::new(),
        }
    }

    fn write_byte(&mut self, value: u8) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&[value])?;
        Ok(())
    }

    fn write_bytes(&mut self, value: &[u8]) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(value)?;
        Ok(())
    }

    fn write_int(&mut self, value: i32) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_long(&mut self, value: i64) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_float(&mut self, value: f32) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_char(&mut self, value: char) -> Result<(), BinarySerializationError> {
        self.buffer.write_all(&u32::from(value).to_le_bytes())?;
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<(), BinarySerializationError> {
        self.write_byte(value as u8)
    }

    fn write_length(&mut self, value: usize) -> Result<(), BinarySerializationError> {
        if value > i32::MAX as usize {
            return Err(BinarySerializationError::ValueArrayTooLong);
        }
        self.write_int(value as i32)
    }

    fn write_array<V>(
        &mut self,
        values: &[V],
        write: impl Fn(&mut Self, &V) -> Result<(), BinarySerializationError>,
    ) -> Result<(), BinarySerializationError> {
        self.write_length(values.len())?;
        for value in values {
            write(self, value)?;
        }
        Ok(())
    }

    fn add_string_to_table(&mut self, value: &str) {
        if !self.string_table.contains(value) {
            self.string_table.insert(value.to_string());
        }
    }

    fn write_string_table(&mut self) -> Result<(), BinarySerializationError> {
        if self.string_table.len() > i32::MAX as usize {
            return Err(BinarySerializationError::TooManyStrings);
        }

        self.write_int(self.string_table.len() as i32)?;

        for string in &self.string_table {
            if string.len() > i32::MAX as usize {
                return Err(BinarySerializationError::StringTooLong);
            }
            self.buffer.write_all(&(string.len() as i32).to_le_bytes())?;
            self.buffer.write_all(string.as_bytes())?;
        }

        Ok(())
    }

    fn write_string_index(&mut self, value: &str) -> Result<(), BinarySerializationError> {
        let index = self.string_table.get_index_of(value).ok_or(BinarySerializationError::InvalidStringIndex)?;
        self.write_int(index as i32)
    }
}

struct BinaryReader<T: BufRead> {
    buffer: T,
    string_table: Vec<String>,
}

impl<T: BufRead> BinaryReader<T> {
    fn new(buffer: T) -> Self {
        Self {
            buffer,
            string_table: Vec::new(),
        }
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], BinarySerializationError> {
        let mut bytes = [0; N];
        self.buffer.read_exact(&mut bytes).map_err(|error| match error.kind() {
            std::io::ErrorKind::UnexpectedEof => BinarySerializationError::UnexpectedEnd,
            _ => BinarySerializationError::Io(error),
        })?;
        Ok(bytes)
    }

    fn read_byte(&mut self) -> Result<u8, BinarySerializationError> {
        Ok(self.read_bytes::<1>()?[0])
    }

    fn read_bool(&mut self) -> Result<bool, BinarySerializationError> {
        Ok(self.read_byte()? != 0)
    }

    fn read_int(&mut self) -> Result<i32, BinarySerializationError> {
        Ok(i32::from_le_bytes(self.read_bytes()?))
    }

    fn read_long(&mut self) -> Result<i64, BinarySerializationError> {
        Ok(i64::from_le_bytes(self.read_bytes()?))
    }

    fn read_float(&mut self) -> Result<f32, BinarySerializationError> {
        Ok(f32::from_le_bytes(self.read_bytes()?))
    }

    fn read_double(&mut self) -> Result<f64, BinarySerializationError> {
        Ok(f64::from_le_bytes(self.read_bytes()?))
    }

    fn read_char(&mut self) -> Result<char, BinarySerializationError> {
        let code = u32::from_le_bytes(self.read_bytes()?);
        char::from_u32(code).ok_or(BinarySerializationError::InvalidCharacter(code))
    }

    fn read_length(&mut self) -> Result<usize, BinarySerializationError> {
        usize::try_from(self.read_int()?).map_err(|_| BinarySerializationError::InvalidLength)
    }

    fn read_array<V>(
        &mut self,
        read: impl Fn(&mut Self) -> Result<V, BinarySerializationError>,
    ) -> Result<Vec<V>, BinarySerializationError> {
        let length = self.read_length()?;
        let mut values = Vec::with_capacity(length.min(PREALLOCATION_LIMIT));

        for _ in 0..length {
            values.push(read(self)?);
        }

        Ok(values)
    }

    fn read_string(&mut self) -> Result<String, BinarySerializationError> {
        let length = self.read_length()?;
        let mut string_buffer = Vec::with_capacity(length.min(PREALLOCATION_LIMIT));
        (&mut self.buffer).take(length as u64).read_to_end(&mut string_buffer)?;

        if string_buffer.len() != length {
            return Err(BinarySerializationError::UnexpectedEnd);
        }

        Ok(String::from_utf8_lossy(&string_buffer).into_owned())
    }

    fn read_string_table(&mut self) -> Result<(), BinarySerializationError> {
        let string_count = self.read_length()?;
        self.string_table = Vec::with_capacity(string_count.min(PREALLOCATION_LIMIT));

        for _ in 0..string_count {
            let string = self.read_string()?;
            self.string_table.push(string);
        }

        Ok(())
    }

    fn get_string(&mut self) -> Result<String, BinarySerializationError> {
        let index = usize::try_from(self.read_int()?).map_err(|_| BinarySerializationError::InvalidStringIndex)?;
        self.string_table.get(index).cloned().ok_or(BinarySerializationError::InvalidStringIndex)
    }
}

/// A decoded entry, before nested states are linked up.
enum Entry {
    Value(Value),
    State(usize),
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Open,
    Done(usize),
}

/// Rejects cycles and nesting deeper than [SavedState::MAX_NESTING_DEPTH] in a table of states.
///
/// `children` holds, for every state, the index and key of each state nested in it.
fn check_nesting(children: &[Vec<(usize, String)>]) -> Result<(), BinarySerializationError> {
    let mut visits = vec![Visit::New; children.len()];

    for start in 0..children.len() {
        if visits[start] != Visit::New {
            continue;
        }

        visits[start] = Visit::Open;
        let mut path = vec![(start, 0)];

        while let Some(&(state, position)) = path.last() {
            match children[state].get(position) {
                Some((child, key)) => {
                    let top = path.len() - 1;
                    path[top].1 += 1;

                    match visits[*child] {
                        Visit::New => {
                            visits[*child] = Visit::Open;
                            path.push((*child, 0));
                        }
                        Visit::Open => return Err(BinarySerializationError::CyclicState(key.clone())),
                        Visit::Done(_) => {}
                    }
                }
                None => {
                    let depth = children[state]
                        .iter()
                        .filter_map(|(child, _)| match visits[*child] {
                            Visit::Done(depth) => Some(depth),
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0)
                        + 1;

                    if depth > SavedState::MAX_NESTING_DEPTH {
                        return Err(BinarySerializationError::NestingTooDeep(SavedState::MAX_NESTING_DEPTH));
                    }

                    visits[state] = Visit::Done(depth);
                    path.pop();
                }
            }
        }
    }

    Ok(())
}

/// Writes states in a compact little-endian layout.
///
/// Nested states are written once and referenced by index, so states shared by several keys stay shared.
pub struct BinarySerializer;

impl Serializer for BinarySerializer {
    type Error = BinarySerializationError;

    fn name() -> &'static str {
        "binary"
    }

    fn version() -> i32 {
        1
    }

    fn serialize(buffer: &mut impl Write, header: &Header, root: &SavedState) -> Result<(), Self::Error> {
        if !header.is_valid() {
            return Err(BinarySerializationError::InvalidHeader);
        }

        let collected_states = root.collect_states();

        if collected_states.len() > i32::MAX as usize {
            return Err(BinarySerializationError::TooManyStates);
        }

        let children: Vec<Vec<(usize, String)>> = collected_states
            .iter()
            .map(|state| {
                state
                    .reader()
                    .iter()
                    .filter_map(|(key, value)| match value {
                        Value::SavedState(nested) => collected_states.get_index_of(nested).map(|index| (index, key.to_string())),
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        check_nesting(&children)?;

        let mut writer = BinaryWriter::new(buffer);
        writer.write_bytes(header.create_header(Self::name(), Self::version()).as_bytes())?;
        writer.write_byte(0)?;

        for state in &collected_states {
            let reader = state.reader();

            for key in reader.keys() {
                writer.add_string_to_table(key);

                match reader.get(key) {
                    Some(Value::String(value)) => writer.add_string_to_table(value),
                    Some(Value::StringList(values)) => values.iter().for_each(|value| writer.add_string_to_table(value)),
                    Some(Value::StringArray(values)) => values.iter().for_each(|value| writer.add_string_to_table(value)),
                    _ => {}
                }
            }
        }

        writer.write_string_table()?;
        writer.write_int(collected_states.len() as i32)?;

        for state in &collected_states {
            let reader = state.reader();
            writer.write_length(reader.size())?;

            for key in reader.keys() {
                let Some(value) = reader.get(key) else {
                    continue;
                };

                writer.write_string_index(key)?;
                writer.write_byte(value.kind().tag())?;

                match value {
                    Value::Null => {}
                    Value::Boolean(value) => writer.write_bool(*value)?,
                    Value::Char(value) => writer.write_char(*value)?,
                    Value::Double(value) => writer.write_double(*value)?,
                    Value::Float(value) => writer.write_float(*value)?,
                    Value::Int(value) => writer.write_int(*value)?,
                    Value::Long(value) => writer.write_long(*value)?,
                    Value::String(value) => writer.write_string_index(value)?,
                    Value::SavedState(value) => {
                        let index = collected_states.get_index_of(value).ok_or(BinarySerializationError::MissingState)?;
                        writer.write_int(index as i32)?;
                    }
                    Value::IntList(values) => writer.write_array(values, |writer, value| writer.write_int(*value))?,
                    Value::StringList(values) => writer.write_array(values, |writer, value| writer.write_string_index(value))?,
                    Value::BooleanArray(values) => writer.write_array(values, |writer, value| writer.write_bool(*value))?,
                    Value::CharArray(values) => writer.write_array(values, |writer, value| writer.write_char(*value))?,
                    Value::DoubleArray(values) => writer.write_array(values, |writer, value| writer.write_double(*value))?,
                    Value::FloatArray(values) => writer.write_array(values, |writer, value| writer.write_float(*value))?,
                    Value::IntArray(values) => writer.write_array(values, |writer, value| writer.write_int(*value))?,
                    Value::LongArray(values) => writer.write_array(values, |writer, value| writer.write_long(*value))?,
                    Value::StringArray(values) => writer.write_array(values, |writer, value| writer.write_string_index(value))?,
                }
            }
        }

        log::debug!(
            "Serialized {} states with {} strings in binary encoding",
            collected_states.len(),
            writer.string_table.len()
        );

        Ok(())
    }

    fn deserialize(buffer: &mut impl BufRead, encoding: String, version: i32) -> Result<SavedState, Self::Error> {
        if encoding != Self::name() {
            return Err(BinarySerializationError::WrongEncoding);
        }

        if version < 1 || version > Self::version() {
            return Err(BinarySerializationError::InvalidEncodingVersion);
        }

        let mut reader = BinaryReader::new(buffer);
        reader.read_byte()?; // Skip byte from header

        reader.read_string_table()?;
        let state_count = reader.read_length()?;

        if state_count == 0 {
            return Err(BinarySerializationError::MissingRoot);
        }

        let mut decoded: Vec<Vec<(String, Entry)>> = Vec::with_capacity(state_count.min(PREALLOCATION_LIMIT));

        for _ in 0..state_count {
            let value_count = reader.read_length()?;
            let mut entries = Vec::with_capacity(value_count.min(PREALLOCATION_LIMIT));

            for _ in 0..value_count {
                let key = reader.get_string()?;
                let value_type = reader.read_byte()?;
                let value_kind = ValueKind::from_tag(value_type).ok_or(BinarySerializationError::InvalidValueType(value_type))?;

                let value = match value_kind {
                    ValueKind::Null => Value::Null,
                    ValueKind::Boolean => Value::Boolean(reader.read_bool()?),
                    ValueKind::Char => Value::Char(reader.read_char()?),
                    ValueKind::Double => Value::Double(reader.read_double()?),
                    ValueKind::Float => Value::Float(reader.read_float()?),
                    ValueKind::Int => Value::Int(reader.read_int()?),
                    ValueKind::Long => Value::Long(reader.read_long()?),
                    ValueKind::String => Value::String(reader.get_string()?),
                    ValueKind::SavedState => {
                        let nested_index = reader.read_length().map_err(|_| BinarySerializationError::MissingState)?;
                        if nested_index >= state_count {
                            return Err(BinarySerializationError::MissingState);
                        }
                        entries.push((key, Entry::State(nested_index)));
                        continue;
                    }
                    ValueKind::IntList => Value::IntList(reader.read_array(BinaryReader::read_int)?),
                    ValueKind::StringList => Value::StringList(reader.read_array(BinaryReader::get_string)?),
                    ValueKind::BooleanArray => Value::BooleanArray(reader.read_array(BinaryReader::read_bool)?.into()),
                    ValueKind::CharArray => Value::CharArray(reader.read_array(BinaryReader::read_char)?.into()),
                    ValueKind::DoubleArray => Value::DoubleArray(reader.read_array(BinaryReader::read_double)?.into()),
                    ValueKind::FloatArray => Value::FloatArray(reader.read_array(BinaryReader::read_float)?.into()),
                    ValueKind::IntArray => Value::IntArray(reader.read_array(BinaryReader::read_int)?.into()),
                    ValueKind::LongArray => Value::LongArray(reader.read_array(BinaryReader::read_long)?.into()),
                    ValueKind::StringArray => Value::StringArray(reader.read_array(BinaryReader::get_string)?.into()),
                };

                entries.push((key, Entry::Value(value)));
            }

            decoded.push(entries);
        }

        let children: Vec<Vec<(usize, String)>> = decoded
            .iter()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(key, entry)| match entry {
                        Entry::State(index) => Some((*index, key.clone())),
                        Entry::Value(_) => None,
                    })
                    .collect()
            })
            .collect();
        check_nesting(&children)?;

        // The table holds no cycles now, so states are linked without checking each write.
        let states: Vec<SavedState> = decoded.iter().map(|_| SavedState::new()).collect();

        for (state, entries) in states.iter().zip(decoded) {
            let mut writer = state.writer();
            writer.reserve(entries.len());

            for (key, entry) in entries {
                let value = match entry {
                    Entry::Value(value) => value,
                    Entry::State(index) => Value::SavedState(states[index].clone()),
                };
                writer.put_unchecked(key, value);
            }
        }

        log::debug!("Deserialized {} states with {} strings", state_count, reader.string_table.len());

        states.into_iter().next().ok_or(BinarySerializationError::MissingRoot)
    }
}
