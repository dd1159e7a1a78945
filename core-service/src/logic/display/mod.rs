//! Display Module - Bridge between rendered images and the presentation layer

pub mod store;

#[cfg(test)]
mod tests;

pub use store::{verify_png, ImageNaming, ImageStore, PublishedImage};
