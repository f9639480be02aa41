//! `PlantUML` text encoding.
//!
//! The `PlantUML` server accepts diagrams as a URL path segment: the UTF-8
//! source compressed with raw deflate (no zlib header or checksum), then
//! base64-encoded with the alphabet `0-9A-Za-z-_` instead of `A-Za-z0-9+/`.
//! See <https://plantuml.com/text-encoding>.

use std::io::Write;

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::PAD;
use flate2::Compression;
use flate2::write::DeflateEncoder;

const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid PlantUML alphabet"),
    };

const PLANTUML_BASE64: GeneralPurpose = GeneralPurpose::new(&PLANTUML_ALPHABET, PAD);

/// Encode a diagram into a token for the `PlantUML` server.
///
/// Deterministic: the same text always yields the same token.
#[must_use]
pub fn encode(text: &str) -> String {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(text.len()), Compression::default());
    // The sink is a Vec, whose `Write` impl never returns an error
    let compressed = encoder
        .write_all(text.as_bytes())
        .and_then(|()| encoder.finish())
        .expect("writing to a Vec is infallible");
    PLANTUML_BASE64.encode(compressed)
}
