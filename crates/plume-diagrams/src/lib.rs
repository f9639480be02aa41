//! `PlantUML` diagram rendering for Plume.
//!
//! This crate turns diagram schemes into embeddable SVG through a remote
//! `PlantUML` server:
//! - [`encode`] prepares a scheme for the server's URL format
//! - [`Translator`] renders batches of schemes in parallel, tolerating
//!   per-diagram failures
//! - [`render_pending`] renders whatever a [`DiagramStore`] has not cached yet
//!
//! # Architecture
//!
//! - [`encoder`]: deflate + custom base64 token encoding
//! - [`translator`]: parallel HTTP rendering
//! - [`svg`]: SVG comment stripping and restyling
//! - [`pipeline`]: glue between a store and a translator
//!
//! # Example
//!
//! ```no_run
//! use plume_config::{CacheConfig, PlantUmlConfig};
//! use plume_diagrams::{Translator, render_pending};
//! use plume_store::{DiagramRecord, DiagramStore, ThemeMode, open_store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = open_store(&CacheConfig::default())?;
//! let key = store.add(DiagramRecord::new("@startuml\nA -> B\n@enduml", ThemeMode::Light));
//!
//! let translator = Translator::new(&PlantUmlConfig::new("https://www.plantuml.com/plantuml"))?;
//! render_pending(store.as_mut(), &translator)?;
//!
//! let svg = store.get(&key).and_then(|record| record.svg());
//! store.persist()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`DiagramStore`]: plume_store::DiagramStore

mod consts;
pub mod encoder;
pub mod pipeline;
pub mod svg;
pub mod translator;

pub use encoder::encode;
pub use pipeline::render_pending;
pub use translator::{Translator, TranslatorError};
