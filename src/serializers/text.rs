use std::{
    fmt::Write as _,
    io::{BufRead, Error, Read, Write},
    iter::Peekable,
    str::{Chars, FromStr},
};

use thiserror::Error as ThisError;

use crate::{Header, SavedState, Serializer, Value, ValueKind};

#[derive(Debug, ThisError)]
pub enum TextSerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] Error),
    #[error("Header Serializer Version Is Different")]
    InvalidEncodingVersion,
    #[error("Header Serializer Is Different")]
    WrongEncoding,
    #[error("Found Unknown Token: {0} Line: {1}")]
    UnknownToken(char, usize),
    #[error("Found Unknown Escape Character: {0} Line: {1}")]
    UnknownEscapeCharacter(char, usize),
    #[error("Unterminated String On Line: {0}")]
    UnterminatedString(usize),
    #[error("Invalid Token On Line: {0}")]
    InvalidToken(usize),
    #[error("Unexpected End Of Text")]
    UnexpectedEnd,
    #[error("Failed To Parse Integer On Line: {0}")]
    FailedToParseInteger(usize),
    #[error("Failed To Parse Float On Line: {0}")]
    FailedToParseFloat(usize),
    #[error("Unknown Value Type {0} On Line: {1}")]
    UnknownValueType(String, usize),
    #[error("Invalid Value On Line: {0}")]
    InvalidValue(usize),
    #[error("States Nested Deeper Than {0} Levels")]
    NestingTooDeep(usize),
    #[error("Header Format Is Empty, Too Long Or Contains Whitespace")]
    InvalidHeader,
}

struct StringWriter<T: Write> {
    buffer: T,
    tab_index: usize,
}

impl<T: Write> StringWriter<T> {
    fn new(buffer: T) -> Self {
        Self { buffer, tab_index: 0 }
    }

    fn write_tabs(&mut self) -> Result<(), TextSerializationError> {
        if self.tab_index == 0 {
            return Ok(());
        }
        self.buffer.write_all(&vec![b'\t'; self.tab_index])?;
        Ok(())
    }

    fn write_raw(&mut self, string: &str) -> Result<(), TextSerializationError> {
        self.buffer.write_all(string.as_bytes())?;
        Ok(())
    }

    fn write_line(&mut self, string: &str) -> Result<(), TextSerializationError> {
        self.write_tabs()?;
        self.buffer.write_all(string.as_bytes())?;
        self.buffer.write_all(b"\n")?;
        Ok(())
    }

    fn write_open_brace(&mut self) -> Result<(), TextSerializationError> {
        self.write_line("{")?;
        self.tab_index += 1;
        Ok(())
    }

    fn write_close_brace(&mut self) -> Result<(), TextSerializationError> {
        self.tab_index -= 1;
        self.write_line("}")
    }

    fn write_array<V>(&mut self, values: &[V], to_text: impl Fn(&V) -> String) -> Result<(), TextSerializationError> {
        self.write_line("[")?;
        self.tab_index += 1;
        if let Some((last, values)) = values.split_last() {
            for value in values {
                self.write_line(&format!("{},", quote(&to_text(value))))?;
            }
            self.write_line(&quote(&to_text(last)))?;
        }
        self.tab_index -= 1;
        self.write_line("]")
    }

    fn write_state(&mut self, state: &SavedState, depth: usize) -> Result<(), TextSerializationError> {
        if depth >= SavedState::MAX_NESTING_DEPTH {
            return Err(TextSerializationError::NestingTooDeep(SavedState::MAX_NESTING_DEPTH));
        }

        self.write_open_brace()?;

        let reader = state.reader();
        for key in reader.keys() {
            let Some(value) = reader.get(key) else {
                continue;
            };

            let entry = format!("{} {}", quote(key), quote(value.kind().name()));

            match value {
                Value::Null => self.write_line(&entry)?,
                Value::Boolean(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::Char(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::Double(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::Float(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::Int(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::Long(value) => self.write_line(&format!("{} {}", entry, quote(&value.to_string())))?,
                Value::String(value) => self.write_line(&format!("{} {}", entry, quote(value)))?,
                Value::SavedState(value) => {
                    self.write_line(&entry)?;
                    self.write_state(value, depth + 1)?;
                }
                Value::IntList(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, i32::to_string)?;
                }
                Value::StringList(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, String::clone)?;
                }
                Value::BooleanArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, bool::to_string)?;
                }
                Value::CharArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, char::to_string)?;
                }
                Value::DoubleArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, f64::to_string)?;
                }
                Value::FloatArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, f32::to_string)?;
                }
                Value::IntArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, i32::to_string)?;
                }
                Value::LongArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, i64::to_string)?;
                }
                Value::StringArray(values) => {
                    self.write_line(&entry)?;
                    self.write_array(values, String::clone)?;
                }
            }
        }

        self.write_close_brace()
    }
}

/// Wraps the string in quotes, escaping quotes, backslashes and control characters.
fn quote(string: &str) -> String {
    let mut quoted = String::with_capacity(string.len() + 2);
    quoted.push('"');
    for character in string.chars() {
        match character {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            character if character.is_control() => {
                let _ = write!(quoted, "\\u{{{:x}}}", character as u32);
            }
            character => quoted.push(character),
        }
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, PartialEq)]
enum StringToken {
    String(String),
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
}

struct StringReader<'a> {
    characters: Peekable<Chars<'a>>,
    line_count: usize,
}

impl<'a> StringReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            characters: text.chars().peekable(),
            line_count: 1,
        }
    }

    fn next_token(&mut self) -> Result<Option<(StringToken, usize)>, TextSerializationError> {
        loop {
            let Some(character) = self.characters.next() else {
                return Ok(None);
            };

            let token = match character {
                '\n' => {
                    self.line_count += 1;
                    continue;
                }
                character if character.is_whitespace() => continue,
                '/' => {
                    if self.characters.next_if_eq(&'/').is_none() {
                        return Err(TextSerializationError::UnknownToken('/', self.line_count));
                    }
                    while self.characters.next_if(|&character| character != '\n').is_some() {}
                    continue;
                }
                '{' => StringToken::OpenBrace,
                '}' => StringToken::CloseBrace,
                '[' => StringToken::OpenBracket,
                ']' => StringToken::CloseBracket,
                ',' => StringToken::Comma,
                '"' => {
                    let line = self.line_count;
                    return Ok(Some((StringToken::String(self.read_quoted()?), line)));
                }
                character => return Err(TextSerializationError::UnknownToken(character, self.line_count)),
            };

            return Ok(Some((token, self.line_count)));
        }
    }

    fn read_quoted(&mut self) -> Result<String, TextSerializationError> {
        let start_line = self.line_count;
        let mut string = String::new();

        loop {
            match self.characters.next() {
                None => return Err(TextSerializationError::UnterminatedString(start_line)),
                Some('"') => return Ok(string),
                Some('\\') => match self.characters.next() {
                    Some('"') => string.push('"'),
                    Some('\\') => string.push('\\'),
                    Some('n') => string.push('\n'),
                    Some('r') => string.push('\r'),
                    Some('t') => string.push('\t'),
                    Some('u') => string.push(self.read_unicode_escape()?),
                    Some(character) => return Err(TextSerializationError::UnknownEscapeCharacter(character, self.line_count)),
                    None => return Err(TextSerializationError::UnterminatedString(start_line)),
                },
                Some(character) => {
                    if character == '\n' {
                        self.line_count += 1;
                    }
                    string.push(character);
                }
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char, TextSerializationError> {
        if self.characters.next_if_eq(&'{').is_none() {
            return Err(TextSerializationError::UnknownEscapeCharacter('u', self.line_count));
        }

        let mut code = String::new();
        while let Some(digit) = self.characters.next_if(char::is_ascii_hexdigit) {
            code.push(digit);
        }

        if self.characters.next_if_eq(&'}').is_none() || code.is_empty() || code.len() > 6 {
            return Err(TextSerializationError::UnknownEscapeCharacter('u', self.line_count));
        }

        u32::from_str_radix(&code, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(TextSerializationError::UnknownEscapeCharacter('u', self.line_count))
    }

    fn expect_token(&mut self) -> Result<(StringToken, usize), TextSerializationError> {
        self.next_token()?.ok_or(TextSerializationError::UnexpectedEnd)
    }

    fn expect_string(&mut self) -> Result<(String, usize), TextSerializationError> {
        match self.expect_token()? {
            (StringToken::String(string), line) => Ok((string, line)),
            (_, line) => Err(TextSerializationError::InvalidToken(line)),
        }
    }

    fn expect(&mut self, expected: StringToken) -> Result<(), TextSerializationError> {
        match self.expect_token()? {
            (token, _) if token == expected => Ok(()),
            (_, line) => Err(TextSerializationError::InvalidToken(line)),
        }
    }
}

fn parse_number<N: FromStr>(string: &str, line: usize, float: bool) -> Result<N, TextSerializationError> {
    string.trim().parse().map_err(|_| {
        if float {
            TextSerializationError::FailedToParseFloat(line)
        } else {
            TextSerializationError::FailedToParseInteger(line)
        }
    })
}

fn parse_int(string: String, line: usize) -> Result<i32, TextSerializationError> {
    parse_number(&string, line, false)
}

fn parse_long(string: String, line: usize) -> Result<i64, TextSerializationError> {
    parse_number(&string, line, false)
}

fn parse_float(string: String, line: usize) -> Result<f32, TextSerializationError> {
    parse_number(&string, line, true)
}

fn parse_double(string: String, line: usize) -> Result<f64, TextSerializationError> {
    parse_number(&string, line, true)
}

fn parse_bool(string: String, line: usize) -> Result<bool, TextSerializationError> {
    match string.as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(TextSerializationError::InvalidValue(line)),
    }
}

fn parse_char(string: String, line: usize) -> Result<char, TextSerializationError> {
    let mut characters = string.chars();
    match (characters.next(), characters.next()) {
        (Some(character), None) => Ok(character),
        _ => Err(TextSerializationError::InvalidValue(line)),
    }
}

fn parse_string(string: String, _line: usize) -> Result<String, TextSerializationError> {
    Ok(string)
}

fn read_array<V>(
    reader: &mut StringReader<'_>,
    parse: impl Fn(String, usize) -> Result<V, TextSerializationError>,
) -> Result<Vec<V>, TextSerializationError> {
    reader.expect(StringToken::OpenBracket)?;
    let mut values = Vec::new();

    loop {
        match reader.expect_token()? {
            (StringToken::CloseBracket, _) => return Ok(values),
            (StringToken::String(string), line) => values.push(parse(string, line)?),
            (_, line) => return Err(TextSerializationError::InvalidToken(line)),
        }

        match reader.expect_token()? {
            (StringToken::Comma, _) => continue,
            (StringToken::CloseBracket, _) => return Ok(values),
            (_, line) => return Err(TextSerializationError::InvalidToken(line)),
        }
    }
}

fn read_state(reader: &mut StringReader<'_>, depth: usize) -> Result<SavedState, TextSerializationError> {
    if depth >= SavedState::MAX_NESTING_DEPTH {
        return Err(TextSerializationError::NestingTooDeep(SavedState::MAX_NESTING_DEPTH));
    }

    reader.expect(StringToken::OpenBrace)?;
    let state = SavedState::new();
    let mut writer = state.writer();

    loop {
        let key = match reader.expect_token()? {
            (StringToken::CloseBrace, _) => break,
            (StringToken::String(key), _) => key,
            (_, line) => return Err(TextSerializationError::InvalidToken(line)),
        };

        let (kind_name, line) = reader.expect_string()?;
        let value_kind =
            ValueKind::from_str(&kind_name).map_err(|_| TextSerializationError::UnknownValueType(kind_name.clone(), line))?;

        let value = match value_kind {
            ValueKind::Null => Value::Null,
            ValueKind::Boolean => {
                let (string, line) = reader.expect_string()?;
                Value::Boolean(parse_bool(string, line)?)
            }
            ValueKind::Char => {
                let (string, line) = reader.expect_string()?;
                Value::Char(parse_char(string, line)?)
            }
            ValueKind::Double => {
                let (string, line) = reader.expect_string()?;
                Value::Double(parse_double(string, line)?)
            }
            ValueKind::Float => {
                let (string, line) = reader.expect_string()?;
                Value::Float(parse_float(string, line)?)
            }
            ValueKind::Int => {
                let (string, line) = reader.expect_string()?;
                Value::Int(parse_int(string, line)?)
            }
            ValueKind::Long => {
                let (string, line) = reader.expect_string()?;
                Value::Long(parse_long(string, line)?)
            }
            ValueKind::String => Value::String(reader.expect_string()?.0),
            ValueKind::SavedState => Value::SavedState(read_state(reader, depth + 1)?),
            ValueKind::IntList => Value::IntList(read_array(reader, parse_int)?),
            ValueKind::StringList => Value::StringList(read_array(reader, parse_string)?),
            ValueKind::BooleanArray => Value::BooleanArray(read_array(reader, parse_bool)?.into()),
            ValueKind::CharArray => Value::CharArray(read_array(reader, parse_char)?.into()),
            ValueKind::DoubleArray => Value::DoubleArray(read_array(reader, parse_double)?.into()),
            ValueKind::FloatArray => Value::FloatArray(read_array(reader, parse_float)?.into()),
            ValueKind::IntArray => Value::IntArray(read_array(reader, parse_int)?.into()),
            ValueKind::LongArray => Value::LongArray(read_array(reader, parse_long)?.into()),
            ValueKind::StringArray => Value::StringArray(read_array(reader, parse_string)?.into()),
        };

        // A freshly parsed state is never reachable from its children.
        writer.put_unchecked(key, value);
    }

    drop(writer);
    Ok(state)
}

/// Writes states as indented, human readable text.
///
/// Shared nested states are written out at every key that holds them, and come back as separate states.
pub struct TextSerializer;

impl Serializer for TextSerializer {
    type Error = TextSerializationError;

    fn name() -> &'static str {
        "text"
    }

    fn version() -> i32 {
        1
    }

    fn serialize(buffer: &mut impl Write, header: &Header, root: &SavedState) -> Result<(), Self::Error> {
        if !header.is_valid() {
            return Err(TextSerializationError::InvalidHeader);
        }

        let mut writer = StringWriter::new(buffer);
        writer.write_raw(&header.create_header(Self::name(), Self::version()))?;
        writer.write_state(root, 0)
    }

    fn deserialize(buffer: &mut impl BufRead, encoding: String, version: i32) -> Result<SavedState, Self::Error> {
        if encoding != Self::name() {
            return Err(TextSerializationError::WrongEncoding);
        }

        if version < 1 || version > Self::version() {
            return Err(TextSerializationError::InvalidEncodingVersion);
        }

        let mut text = String::new();
        buffer.read_to_string(&mut text)?;

        let mut reader = StringReader::new(&text);
        // The header line was consumed before this point.
        reader.line_count = 2;

        let root = read_state(&mut reader, 0)?;

        if let Some((_, line)) = reader.next_token()? {
            return Err(TextSerializationError::InvalidToken(line));
        }

        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_strings_read_back() {
        let original = "tab\there \"quoted\" back\\slash\nnew line \u{7} bell";
        let quoted = quote(original);
        assert!(!quoted.contains('\n'));

        let mut reader = StringReader::new(&quoted);
        let (token, _) = reader.next_token().unwrap().unwrap();
        assert_eq!(token, StringToken::String(original.to_string()));
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let mut reader = StringReader::new("// first\n// second\n\"value\"");
        let (token, line) = reader.next_token().unwrap().unwrap();
        assert_eq!(token, StringToken::String("value".to_string()));
        assert_eq!(line, 3);
    }

    #[test]
    fn single_slash_is_rejected() {
        let mut reader = StringReader::new("/ nope");
        assert!(matches!(reader.next_token(), Err(TextSerializationError::UnknownToken('/', 1))));
    }
}
