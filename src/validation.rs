//! 公共验证函数模块
//! 校验会话消息中的显示名称、用户 ID 与消息文本，供会话日志写入使用。

use crate::constants::{MAX_DISPLAY_NAME_LEN, MAX_MESSAGE_LEN, MAX_USER_ID_LEN, SYSTEM_USER};

/// 显示名称：去除首尾空白后 1-32 字符，不得包含控制字符，不得冒用系统用户
pub fn validate_display_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    let char_count = trimmed.chars().count();
    if char_count == 0 {
        return Err("Display name must not be empty");
    }
    if char_count > MAX_DISPLAY_NAME_LEN {
        return Err("Display name is too long");
    }
    if trimmed.chars().any(char::is_control) {
        return Err("Display name contains control characters");
    }
    if trimmed.eq_ignore_ascii_case(SYSTEM_USER) {
        return Err("Display name is reserved");
    }
    Ok(())
}

/// 用户 ID：1-64 字符，只允许字母、数字、下划线和连字符
pub fn validate_user_id(user_id: &str) -> Result<(), &'static str> {
    let char_count = user_id.chars().count();
    if char_count == 0 || char_count > MAX_USER_ID_LEN {
        return Err("User id must be between 1 and 64 characters");
    }
    if !user_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err("User id may only contain letters, digits, '-' and '_'");
    }
    if user_id == SYSTEM_USER {
        return Err("User id is reserved");
    }
    Ok(())
}

/// 消息文本：最多 500 字符，允许换行与制表符以外不得包含控制字符
pub fn validate_message_text(msg: &str) -> Result<(), &'static str> {
    if msg.chars().count() > MAX_MESSAGE_LEN {
        return Err("Message is too long");
    }
    if msg
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t')
    {
        return Err("Message contains control characters");
    }
    Ok(())
}
