//! 替换引擎核心模块
//!
//! - **引擎** (`engine.rs`): 控制接口（启用、停用、重建）与变更处理
//! - **调度** (`scheduler.rs`): 变更分类、待处理集合与调度状态机
//! - **导航** (`navigation.rs`): 路由变化信号的观察者接口
//!
//! ## 使用示例
//!
//! ```rust
//! use std::rc::Rc;
//! use relabel::document::LiveDocument;
//! use relabel::host::EventLoop;
//! use relabel::substitution::{Dictionary, EnableConfig, Engine, Settings};
//!
//! let event_loop = Rc::new(EventLoop::default());
//! let document = Rc::new(LiveDocument::parse("<div><button>Run</button></div>").unwrap());
//! event_loop.watch(&document);
//!
//! let engine = Engine::new(document.clone(), event_loop.clone(), Settings::default());
//! engine.enable(EnableConfig::with_mapping(Dictionary::from_iter([("Run", "运行")])));
//! event_loop.run_until_idle();
//! ```

pub mod engine;
pub mod navigation;
pub mod scheduler;

pub use engine::{Engine, EngineStats};
pub use navigation::{HistoryNavigation, NavigationCallback, NavigationObserver};
pub use scheduler::{classify, Classification, PendingSet, Scheduler, SchedulerState, Ticket};
