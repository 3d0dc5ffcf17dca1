//! Raw and output stores, and the object store plumbing under them.

mod array_init;
mod output_store;
mod raw_store;
mod store;
mod zarr_reader;
mod zarr_writer;

pub use array_init::{position_name, ArrayInitializer, Provisioned};
pub use output_store::{ArraySpec, OutputStore};
pub use raw_store::{RawStore, Volume};
pub use store::{open_location, parse_s3_uri, StoreLocation};
pub use zarr_reader::ZarrRawStore;
pub use zarr_writer::ZarrOutputStore;
