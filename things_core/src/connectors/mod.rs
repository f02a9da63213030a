pub mod apple_common;
pub mod things;
