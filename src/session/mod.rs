// src/session/mod.rs
//
// Everything that crosses the process boundary: decoding imported files,
// project save/load, and WAV export.

pub mod export;
pub mod import;
pub mod serialization;

pub use export::{ExportFormat, encode_wav_f32, export_mixdown, write_wav_16};
pub use import::{ImportOutcome, decode_file, import_files};
pub use serialization::{SavedProject, load_project, save_project};
