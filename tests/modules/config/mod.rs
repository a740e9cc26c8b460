//! 配置模块测试

pub mod integration;
