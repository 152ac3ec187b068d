//! Resource chunking, index/directory records, and a seekable block reader
//! (spec §C2).

#[macro_use]
extern crate error_chain;

pub mod error;
mod chunker;
mod reader;
mod record;

pub use chunker::{chunk_into_store, index_digest};
pub use reader::Reader;
pub use record::{DirectoryRecord, EntryKind, IndexRecord};
