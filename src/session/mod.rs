//! # 会话管理层
//!
//! 每个标签页/窗口对应一个浏览会话。会话在引擎句柄被替换（崩溃恢复、设置变更、切换引擎）
//! 时保持身份和订阅者不变，并把引擎回调分发给多个监听者。
//!
//! ## 主要功能
//! - **会话生命周期**: 创建、从持久化状态恢复、关闭
//! - **句柄替换**: 两阶段提交，新句柄打开后才关闭旧句柄，只发出一次替换事件
//! - **监听者分发**: 按类别的有序多播，快照语义，单个监听者 panic 不影响其他监听者
//! - **事件汇聚**: 引擎线程的回调统一经由通道投递到控制上下文
//! - **隐私模式**: 创建时固定，占位页替代主页
//!
//! ## 模块结构
//! - `traits`: 监听者与委托 trait 定义
//! - `settings`: 会话设置
//! - `state`: 会话持久状态与导航状态
//! - `fanout`: 监听者集合
//! - `browsing`: `Session` 实现
//! - `events`: 引擎事件处理
//! - `registry`: 会话注册表与事件循环
//!
//! ## 使用示例
//! ```rust,no_run
//! use vrshell_session::session::SessionRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::mock();
//!
//! // 创建会话并设为活动会话
//! let session = registry.create_session(false, None).await?;
//! registry.set_active_session(session.id())?;
//!
//! // 导航并处理引擎回调
//! session.load_uri(Some("https://example.com"));
//! registry.process_pending_events().await;
//! println!("Now at: {}", session.current_uri());
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod settings;
pub mod state;
pub mod fanout;
pub mod browsing;
pub mod events;
pub mod registry;

#[cfg(test)]
pub mod tests;

pub use traits::{
    ContentListener, HistoryDelegate, MediaAvailabilityListener, NavigationListener,
    PermissionDelegate, ProgressListener, PromptDelegate, SessionChangeListener,
    TextInputListener, ThumbnailListener,
};

pub use settings::{BackPolicy, SessionSettings, UserAgentMode, ViewportMode};
pub use state::{HandleState, Media, NavigationState, PersistedSession, SessionId, Thumbnail};
pub use fanout::{ListenerSet, SessionListeners};
pub use browsing::Session;
pub use events::aggregate_votes;
pub use registry::SessionRegistry;
