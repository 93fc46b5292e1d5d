//! omnifs — a uniform, protocol-neutral virtual filesystem abstraction.
//!
//! A backend implements [`backend::Backend`] (list, read a byte range,
//! write via a small multipart-style primitive set, remove, copy) and
//! inherits the full derived-operations table from [`filesystem::FileSystemOps`]:
//! recursive walk, glob expansion, cross-backend copy, bulk cat, size
//! aggregation, all sharing one caching and transaction discipline.

pub mod backend;
pub mod buffered_file;
pub mod cache;
pub mod config;
pub mod dircache;
pub mod error;
pub mod filesystem;
pub mod glob;
pub mod info;
pub mod instance_cache;
pub mod local;
pub mod memory;
pub mod path;
pub mod registry;
pub mod transaction;

pub use backend::Backend;
pub use buffered_file::{BufferedFile, SeekFrom};
pub use config::{FsConfig, OpenOptions};
pub use error::{FsError, Result};
pub use filesystem::{CatResult, DuResult, FileSystemOps, OnError, WalkEntry, WalkStream};
pub use info::{FileInfo, FileType};
pub use instance_cache::{clear_instance_cache, compute_token, current, get_or_construct};
pub use local::LocalFilesystem;
pub use memory::MemoryFilesystem;
pub use registry::{FsDescriptor, FsRegistry};
pub use transaction::{StagedFile, Transaction, TransactionGuard, TransactionState};
