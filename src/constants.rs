/// 同时存活的会话数量上限
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// 生成会话码时的最大尝试次数
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// 会话存活时长（秒），8 小时
pub const DEFAULT_SESSION_TTL_SECS: u64 = 28_800;

/// 测试/模拟环境下的会话存活时长（秒）
pub const EMULATED_SESSION_TTL_SECS: u64 = 60;

/// 过期清理任务的默认 cron（每 8 小时）
pub const DEFAULT_SWEEP_CRON: &str = "0 0 */8 * * *";

/// 会话码长度
pub const SESSION_CODE_LENGTH: usize = 6;

/// Alphanumeric charset with the ambiguous glyphs `0`, `O`, `I` and `l` removed.
pub const SESSION_CODE_CHARSET: &[u8] =
    b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// 系统消息使用的用户名与用户 ID
pub const SYSTEM_USER: &str = "system";

/// 会话创建时写入的首条消息
pub const SESSION_START_MSG: &str = "Session start.";

/// 显示名称最大长度（字符）
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// 用户 ID 最大长度（字符）
pub const MAX_USER_ID_LEN: usize = 64;

/// 单条消息最大长度（字符）
pub const MAX_MESSAGE_LEN: usize = 500;

/// 单种骰子的最大数量
pub const MAX_DICE_PER_KIND: u32 = 99;

/// 默认最大 SSE 并发连接数
pub const DEFAULT_MAX_SSE_CONNECTIONS: usize = 500;

/// 会话事件广播通道容量
pub const SESSION_EVENT_CAPACITY: usize = 256;
