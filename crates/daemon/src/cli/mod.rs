pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Auth, Health, Init, Sfs, Version};
