//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配置模块
//!
//! 定义限流器的配置结构，支持 YAML / TOML / JSON 三种格式。

use crate::constants::{DEFAULT_INTERVAL, DEFAULT_TICK};
use crate::error::LimiterError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 限流器配置
///
/// 时间类参数在序列化格式中以毫秒表示。
///
/// # 示例
/// ```rust
/// use ticketbucket::LimiterConfig;
/// use std::time::Duration;
///
/// let config = LimiterConfig::new(10.0)
///     .with_burst_max(20.0)
///     .with_tick(Duration::from_millis(10));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_accumulation_interval(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// 每秒补充的令牌数
    pub rate: f64,
    /// 单次请求上限，同时也是累计令牌的上限；缺省等于 `rate`
    #[serde(default)]
    pub burst_max: Option<f64>,
    /// 补充间隔
    #[serde(default = "default_interval", with = "duration_ms")]
    pub interval: Duration,
    /// 单次补充计入的最长时间；缺省等于 `interval`
    #[serde(default, with = "option_duration_ms")]
    pub max_accumulation_interval: Option<Duration>,
    /// 等待方的轮询间隔
    #[serde(default = "default_tick", with = "duration_ms")]
    pub tick: Duration,
    /// 初始令牌数；缺省为 `rate` 与 `burst_max` 中较小者
    #[serde(default)]
    pub initial_tickets: Option<f64>,
    /// 取消时是否退还已部分预留的令牌
    #[serde(default)]
    pub refund_on_cancel: bool,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_tick() -> Duration {
    DEFAULT_TICK
}

impl LimiterConfig {
    /// 使用默认参数创建配置
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            burst_max: None,
            interval: DEFAULT_INTERVAL,
            max_accumulation_interval: None,
            tick: DEFAULT_TICK,
            initial_tickets: None,
            refund_on_cancel: false,
        }
    }

    pub fn with_burst_max(mut self, burst_max: f64) -> Self {
        self.burst_max = Some(burst_max);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_accumulation_interval(mut self, max: Duration) -> Self {
        self.max_accumulation_interval = Some(max);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_initial_tickets(mut self, tickets: f64) -> Self {
        self.initial_tickets = Some(tickets);
        self
    }

    pub fn with_refund_on_cancel(mut self, refund: bool) -> Self {
        self.refund_on_cancel = refund;
        self
    }

    /// 生效的突发上限
    pub fn burst_max(&self) -> f64 {
        self.burst_max.unwrap_or(self.rate)
    }

    /// 生效的最长累计时间
    pub fn max_accumulation_interval(&self) -> Duration {
        self.max_accumulation_interval.unwrap_or(self.interval)
    }

    /// 生效的初始令牌数
    pub fn initial_tickets(&self) -> f64 {
        self.initial_tickets
            .unwrap_or_else(|| self.rate.min(self.burst_max()))
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), LimiterError> {
        validate_rate(self.rate)?;
        validate_burst_max(self.burst_max())?;
        validate_duration("interval", self.interval)?;
        validate_duration("max_accumulation_interval", self.max_accumulation_interval())?;
        validate_duration("tick", self.tick)?;

        let initial = self.initial_tickets();
        if !initial.is_finite() || initial < 0.0 {
            return Err(LimiterError::ConfigError(format!(
                "initial_tickets 必须是非负有限数，当前为 {}",
                initial
            )));
        }
        if initial > self.burst_max() {
            return Err(LimiterError::ConfigError(format!(
                "initial_tickets ({}) 不能超过 burst_max ({})",
                initial,
                self.burst_max()
            )));
        }

        Ok(())
    }

    /// 从 YAML 字符串解析
    pub fn from_yaml_str(content: &str) -> Result<Self, LimiterError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, LimiterError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 字符串解析
    pub fn from_json_str(content: &str) -> Result<Self, LimiterError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置，按扩展名选择格式
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LimiterError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| LimiterError::ConfigError("无法确定配置文件类型".to_string()))?;

        match extension {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            _ => Err(LimiterError::ConfigError(format!(
                "不支持的配置文件类型: {}",
                extension
            ))),
        }
    }
}

pub(crate) fn validate_rate(rate: f64) -> Result<(), LimiterError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(LimiterError::ConfigError(format!(
            "rate 必须是大于 0 的有限数，当前为 {}",
            rate
        )));
    }
    Ok(())
}

pub(crate) fn validate_burst_max(burst_max: f64) -> Result<(), LimiterError> {
    if !burst_max.is_finite() || burst_max <= 0.0 {
        return Err(LimiterError::ConfigError(format!(
            "burst_max 必须是大于 0 的有限数，当前为 {}",
            burst_max
        )));
    }
    Ok(())
}

pub(crate) fn validate_duration(name: &str, value: Duration) -> Result<(), LimiterError> {
    if value.is_zero() {
        return Err(LimiterError::ConfigError(format!("{} 不能为零", name)));
    }
    Ok(())
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
