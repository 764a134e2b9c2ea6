/// 配置管理模組
///
/// 負責加載與驗證系統配置，支持開發與生產環境。配置經建構器顯式傳遞，
/// 不提供進程級全局實例。
// 宣告子模組
pub mod loader;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigExt, ConfigLoader, Environment};
pub use types::*;
pub use validation::{validate_config, ValidationError, ValidationUtils, Validator};
