#[macro_use]
extern crate lazy_static;

pub mod diff;
pub mod filestore;
pub mod logic;
pub mod lzw;
pub mod murmur;
pub mod objects;
pub mod patch;
pub mod pic;
pub mod project;
pub mod util;
pub mod view;
pub mod volume;
pub mod words;
