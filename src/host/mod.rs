//! # 宿主模块
//!
//! 替换引擎依赖的宿主能力：微任务、动画帧、空闲回调与定时器。
//!
//! - `TaskHost` - 引擎调度任务所用的接口
//! - `event_loop` - 基于虚拟时钟的确定性事件循环实现

pub mod event_loop;

use std::time::Duration;

pub use event_loop::EventLoop;

/// 可调度的任务
pub type Task = Box<dyn FnOnce()>;

/// 宿主提供的可选能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// 支持 `request_animation_frame`
    pub animation_frames: bool,
    /// 支持 `request_idle_callback`
    pub idle_callbacks: bool,
}

impl HostCapabilities {
    /// 浏览器式宿主：全部能力可用
    pub fn full() -> Self {
        Self {
            animation_frames: true,
            idle_callbacks: true,
        }
    }

    /// 只有微任务与定时器
    pub fn timers_only() -> Self {
        Self {
            animation_frames: false,
            idle_callbacks: false,
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// 任务宿主
///
/// 不支持某种能力时，`request_*` 方法把任务原样退回，由调用方选择后备方案。
pub trait TaskHost {
    /// 在当前任务结束后的微任务检查点执行
    fn queue_microtask(&self, task: Task);

    /// 在下一个动画帧执行
    fn request_animation_frame(&self, task: Task) -> Result<(), Task>;

    /// 在空闲时执行，最迟不超过 `timeout`
    fn request_idle_callback(&self, task: Task, timeout: Duration) -> Result<(), Task>;

    /// 在 `delay` 之后执行
    fn set_timeout(&self, task: Task, delay: Duration);
}
