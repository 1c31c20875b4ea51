//! # 窗口表面绑定层
//!
//! 把会话的渲染输出交给 VR 场景中的某个窗口表面。
//!
//! ## 主要功能
//! - **显示对象生命周期**: 先释放旧会话的显示对象，再获取新会话的显示对象
//! - **句柄替换跟随**: 会话重建引擎句柄后自动迁移显示对象
//! - **缩略图捕获**: 异步像素捕获，过期结果直接丢弃
//!
//! ## 模块结构
//! - `binding`: `WindowSurfaceBinding` 实现

pub mod binding;

use std::fmt;

use crate::engine::SurfaceRect;

pub use binding::WindowSurfaceBinding;

/// Identity of an in-VR window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// Size of a window surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    /// Border kept free of page content on every side
    pub border: u32,
}

impl SurfaceGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            border: 0,
        }
    }

    pub fn with_border(mut self, border: u32) -> Self {
        self.border = border;
        self
    }

    /// Region the engine composites into
    pub fn content_rect(&self) -> SurfaceRect {
        SurfaceRect {
            left: self.border,
            top: self.border,
            width: self.width.saturating_sub(self.border.saturating_mul(2)),
            height: self.height.saturating_sub(self.border.saturating_mul(2)),
        }
    }
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self::new(800, 450)
    }
}

/// Result of a thumbnail capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Stored in the session and announced
    Captured,
    /// The engine returned no pixels
    NoImage,
    /// No display held, or the handle is closed
    Skipped,
    /// The session moved to another handle during the capture
    Stale,
}
