//! Macro file format: encoding, decoding, streaming read and append-only write.

pub mod codec;

pub use codec::{decode, decode_line, encode, CodecError, MacroReader, MacroWriter};
