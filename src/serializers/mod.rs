//! Structures for serializing and deserializing.

mod binary;
pub use binary::BinarySerializationError;
pub use binary::BinarySerializer;

mod text;
pub use text::TextSerializationError;
pub use text::TextSerializer;
