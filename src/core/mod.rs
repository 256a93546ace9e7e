//! 核心类型：引擎错误分类

pub mod error;

pub use error::EngineError;
