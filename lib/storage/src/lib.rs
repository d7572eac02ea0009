pub mod codebook_file;
pub mod store;

pub use codebook_file::{decode, encode};
pub use store::CodebookStore;
