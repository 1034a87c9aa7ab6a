//! Persistence of extracted events.
//!
//! # Submodules
//!
//! - [`store`]: the append-only CSV dataset ([`EventStore`]) and its tolerant read-back
//!
//! # Output Structure
//!
//! ```text
//! events.csv
//! ├── city,state,event,summary,article_url,source,date-of-event,event-picture-caption,event-picture-link,lat,lon
//! ├── Fort Lauderdale,Florida,Flooding,...,26.1201,-80.1372
//! └── ...                     # one line per event, appended per article
//! ```

pub mod store;

pub use store::{EventStore, FieldPolicy, StoredEvent};
