//! Data model shared by every pipeline stage
//!
//! `url` is the identity of an article from discovery through storage.

pub mod article;
pub mod query;
pub mod request;

pub use article::*;
pub use query::*;
pub use request::*;
