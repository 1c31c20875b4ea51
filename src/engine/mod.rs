//! # 浏览器引擎层
//!
//! 会话层与嵌入式浏览器引擎之间的能力边界。引擎本身是黑盒，这里只定义会话层消费的接口。
//!
//! ## 主要功能
//! - **引擎句柄**: 打开、导航、恢复状态、关闭单个浏览上下文
//! - **显示对象**: 单一消费者的渲染目标，支持像素捕获
//! - **事件回传**: 引擎线程通过 `EventSink` 把回调投递到控制上下文
//!
//! ## 模块结构
//! - `traits`: 引擎运行时、句柄和显示对象的 trait 定义
//! - `types`: 设置、加载标志、回调载荷等数据类型
//! - `mock`: 用于测试和演示的 Mock 引擎
//!
//! ## 使用示例
//! ```rust,no_run
//! use vrshell_session::engine::{EngineRuntime, MockEngineRuntime};
//! use std::sync::Arc;
//!
//! let runtime: Arc<dyn EngineRuntime> = Arc::new(MockEngineRuntime::new());
//! assert!(runtime.alternate_engine_available());
//! ```

pub mod traits;
pub mod types;
pub mod mock;

pub use traits::{Display, EngineHandle, EngineRuntime};

pub use types::{
    AllowOrDeny, BlockCategories, ClearDataFlags, ContentBlockEvent, ContentPermission, ContextElement,
    ContextElementKind, EngineEvent, EngineEventKind, EngineSettings, EngineStateBlob, EventSink,
    HandleId, HistoryEntry, Image, LoadError, LoadErrorCategory, LoadFlags, LoadRequest,
    LoadTarget, MediaElementId, PermissionRequest, PermissionResponse, PromptChoice,
    PromptRequest, PromptResponse, RestartReason, SecurityInfo, Selection, SessionEvent,
    SurfaceRect, VisitFlags,
};

// Re-export mock for development/testing
pub use mock::{DisplayEvent, HandleCall, MockDisplay, MockEngineHandle, MockEngineRuntime};
