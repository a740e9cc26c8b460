//! 测试模块根目录
//!
//! 导出所有功能模块的测试

pub mod config;
