// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持英文（默认）、葡萄牙语（巴西）和中文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

use crate::config::SUPPORTED_LOCALES;

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"en" / "pt-BR" / "zh-CN"）
///
/// # 返回
/// 不支持的语言代码返回 false，当前语言不变
pub fn set_locale(locale: &str) -> bool {
    if !SUPPORTED_LOCALES.contains(&locale) {
        return false;
    }
    rust_i18n::set_locale(locale);
    true
}

/// 串行化修改全局语言的测试
#[cfg(test)]
pub(crate) fn locale_test_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCALE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCALE_TEST_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use fleet_ingest::i18n::t;
/// let msg = t("job.completed");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use fleet_ingest::i18n::t_with_args;
/// let msg = t_with_args("job.failed", &[("reason", "empty file")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 修改语言的测试（含创建会话的测试）经 locale_test_guard 串行化。

    #[test]
    fn test_set_locale() {
        let _guard = locale_test_guard();
        assert!(set_locale("pt-BR"));
        assert_eq!(current_locale(), "pt-BR");

        // 不支持的语言保持原值
        assert!(!set_locale("fr"));
        assert_eq!(current_locale(), "pt-BR");

        // 恢复默认语言
        set_locale("en");
    }

    #[test]
    fn test_translate_simple() {
        let _guard = locale_test_guard();
        set_locale("en");
        assert_eq!(t("job.completed"), "Import completed");

        set_locale("pt-BR");
        assert_eq!(t("job.completed"), "Importação concluída");

        set_locale("en");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = locale_test_guard();
        set_locale("en");
        let msg = t_with_args(
            "row_error.type_mismatch",
            &[("column", "KM"), ("value", "abc"), ("expected", "number"), ("reason", "not a number")],
        );
        assert!(msg.contains("KM"));
        assert!(msg.contains("abc"));

        set_locale("zh-CN");
        let msg = t_with_args("job.failed", &[("reason", "文件无数据行")]);
        assert!(msg.contains("文件无数据行"));
        assert!(msg.contains("导入失败"));

        set_locale("en");
    }
}
