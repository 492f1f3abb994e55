//! 工具模块

pub mod id;

pub use id::generate_id;
