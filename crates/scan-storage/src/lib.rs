//! `scan-storage`
//!
//! Writers that turn a finished (or in-progress) scan table into a file.
//!
//! - [`ScanWriter`]: the writer contract the scan engine calls at PostScan,
//!   or at PreScan when rows are streamed with [`ScanWriter::open_partial`]
//! - [`DefaultWriter`]: the `#E/#D/#C/#S/#N/#L` plain text format
//! - [`unique_file_name`]: `_0001`-style collision avoidance

pub mod default_writer;
pub mod error;
pub mod naming;
pub mod writer;

pub use default_writer::DefaultWriter;
pub use error::StorageError;
pub use naming::unique_file_name;
pub use writer::{RowSink, ScanHeader, ScanWriter};
