//! Typed key/value state containers, their binary and text encodings, and API dump checks.

mod value;

pub use value::Value;
pub use value::ValueKind;

mod state;

pub use state::SavedState;

mod reader;

pub use reader::MissingValueError;
pub use reader::SavedStateReader;

mod writer;

pub use writer::SavedStateWriter;
pub use writer::WriteError;

mod serializing;

pub use serializing::Header;
pub use serializing::SerializationError;
pub use serializing::Serializer;
pub use serializing::deserialize;
pub use serializing::read_file;
pub use serializing::serialize;
pub use serializing::write_file;

pub mod serializers;

pub mod equivalence;
