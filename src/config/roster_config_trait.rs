// ==========================================
// 学生分班引擎 - 分班配置读取 Trait
// ==========================================
// 职责: 定义引擎/API 所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::SectionOrder;
use std::error::Error;

// ==========================================
// RosterConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait RosterConfigReader: Send + Sync {
    /// 获取自动分班时班级的稳定顺序
    ///
    /// # 默认值
    /// - CODE_ASC（按班级代码升序）
    fn get_section_order(&self) -> Result<SectionOrder, Box<dyn Error>>;

    /// 获取未显式指定操作人时记录的默认操作人
    ///
    /// # 默认值
    /// - system
    fn get_default_actor(&self) -> Result<String, Box<dyn Error>>;

    /// 获取操作日志查询的默认条数上限
    ///
    /// # 默认值
    /// - 200
    fn get_action_log_limit(&self) -> Result<i64, Box<dyn Error>>;
}
