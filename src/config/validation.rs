use std::fmt::Display;
use thiserror::Error;

/// 配置驗證錯誤
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("缺少必要配置項: {0}")]
    MissingField(String),

    #[error("無效的配置值: {0}")]
    InvalidValue(String),

    #[error("配置範圍錯誤: {field} 的值 {value} 不在範圍 {min}..{max} 內")]
    RangeError {
        field: String,
        value: String,
        min: String,
        max: String,
    },
}

/// 配置驗證器trait
pub trait Validator {
    /// 驗證配置
    fn validate(&self) -> Result<(), ValidationError>;
}

/// 驗證配置區段
pub fn validate_config<T>(config: &T) -> Result<(), ValidationError>
where
    T: Validator,
{
    config.validate()
}

/// 驗證輔助工具
pub struct ValidationUtils;

impl ValidationUtils {
    /// 驗證字符串非空
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field.to_string()));
        }
        Ok(())
    }

    /// 驗證數值在範圍內
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + Display,
    {
        if value < min || value > max {
            return Err(ValidationError::RangeError {
                field: field.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }

    /// 驗證值屬於允許集合
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ValidationError> {
        if !allowed.contains(&value) {
            return Err(ValidationError::InvalidValue(format!(
                "{} 必須是 {:?} 之一，當前為 {}",
                field, allowed, value
            )));
        }
        Ok(())
    }
}
