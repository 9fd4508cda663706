//! Typed payload codecs for each of the five chunk types.

pub mod conf;
pub mod encr;
pub mod iend;
pub mod ihdr;
pub mod svol;
