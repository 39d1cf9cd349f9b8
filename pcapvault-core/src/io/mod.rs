//! Object storage access, file locations and block decompression.

mod decompress;
mod location;
mod store;

pub use decompress::{decompress_header, Compression, Decompressor};
pub use location::ObjectLocation;
pub use store::{CloudObjectStore, ObjectStoreClient, StoreConfig};
