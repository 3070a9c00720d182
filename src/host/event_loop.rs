//! 确定性事件循环
//!
//! 使用虚拟时钟模拟浏览器事件循环的调度顺序：
//! 每个任务（定时器、动画帧、空闲回调）执行完毕后都会进入一次微任务检查点，
//! 检查点先向观察器交付变更记录，再依次执行微任务，直到两者都为空。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::document::LiveDocument;
use crate::host::{HostCapabilities, Task, TaskHost};

/// 防止任务无限自我调度的迭代上限
const MAX_TURNS: usize = 10_000;

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

struct IdleCallback {
    deadline: Duration,
    task: Task,
}

/// 虚拟时钟事件循环
pub struct EventLoop {
    capabilities: HostCapabilities,
    now: Cell<Duration>,
    seq: Cell<u64>,
    microtasks: RefCell<VecDeque<Task>>,
    frames: RefCell<Vec<Task>>,
    idle: RefCell<Vec<IdleCallback>>,
    timers: RefCell<Vec<Timer>>,
    documents: RefCell<Vec<Weak<LiveDocument>>>,
}

impl EventLoop {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            now: Cell::new(Duration::ZERO),
            seq: Cell::new(0),
            microtasks: RefCell::new(VecDeque::new()),
            frames: RefCell::new(Vec::new()),
            idle: RefCell::new(Vec::new()),
            timers: RefCell::new(Vec::new()),
            documents: RefCell::new(Vec::new()),
        }
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    /// 当前虚拟时间
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// 在微任务检查点向该文档的观察器交付记录
    pub fn watch(&self, document: &Rc<LiveDocument>) {
        self.documents.borrow_mut().push(Rc::downgrade(document));
    }

    pub fn has_pending_work(&self) -> bool {
        !self.microtasks.borrow().is_empty()
            || !self.frames.borrow().is_empty()
            || !self.idle.borrow().is_empty()
            || !self.timers.borrow().is_empty()
            || self.has_undelivered_records()
    }

    fn has_undelivered_records(&self) -> bool {
        self.documents
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|doc| doc.has_pending_records())
    }

    fn deliver_records(&self) -> bool {
        let documents: Vec<Rc<LiveDocument>> = {
            let mut documents = self.documents.borrow_mut();
            documents.retain(|doc| doc.strong_count() > 0);
            documents.iter().filter_map(Weak::upgrade).collect()
        };
        let mut delivered = false;
        for document in documents {
            delivered |= document.deliver_records();
        }
        delivered
    }

    /// 微任务检查点；返回执行的回调数（含记录交付）
    pub fn perform_microtask_checkpoint(&self) -> usize {
        let mut ran = 0;
        for _ in 0..MAX_TURNS {
            if self.deliver_records() {
                ran += 1;
                continue;
            }
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
        tracing::warn!("微任务检查点超过 {} 轮，提前结束", MAX_TURNS);
        ran
    }

    /// 执行一个动画帧：运行此前请求的全部帧回调
    pub fn run_animation_frame(&self) -> usize {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        let count = frames.len();
        for task in frames {
            task();
            self.perform_microtask_checkpoint();
        }
        count
    }

    /// 执行全部已请求的空闲回调
    pub fn run_idle_callbacks(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.idle.borrow_mut());
        let count = callbacks.len();
        for callback in callbacks {
            (callback.task)();
            self.perform_microtask_checkpoint();
        }
        count
    }

    /// 推进虚拟时钟，执行到期的定时器和超时的空闲回调
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut ran = 0;
        loop {
            let timer = self.take_next_timer(target);
            let idle = self.take_expired_idle(target);
            match (timer, idle) {
                (None, None) => break,
                (Some(timer), idle) => {
                    // 超时的空闲回调与定时器按时间先后执行
                    if let Some(idle) = idle {
                        if idle.deadline <= timer.due {
                            self.now.set(self.now.get().max(idle.deadline));
                            (idle.task)();
                            self.perform_microtask_checkpoint();
                            ran += 1;
                            self.timers.borrow_mut().push(timer);
                            continue;
                        }
                        self.idle.borrow_mut().push(idle);
                    }
                    self.now.set(self.now.get().max(timer.due));
                    (timer.task)();
                    self.perform_microtask_checkpoint();
                    ran += 1;
                }
                (None, Some(idle)) => {
                    self.now.set(self.now.get().max(idle.deadline));
                    (idle.task)();
                    self.perform_microtask_checkpoint();
                    ran += 1;
                }
            }
        }
        self.now.set(target);
        ran
    }

    fn take_next_timer(&self, until: Duration) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }

    fn take_expired_idle(&self, until: Duration) -> Option<IdleCallback> {
        let mut idle = self.idle.borrow_mut();
        let index = idle
            .iter()
            .enumerate()
            .filter(|(_, c)| c.deadline <= until)
            .min_by_key(|(_, c)| c.deadline)
            .map(|(i, _)| i)?;
        Some(idle.remove(index))
    }

    fn next_timer_due(&self) -> Option<Duration> {
        self.timers.borrow().iter().map(|t| t.due).min()
    }

    /// 一直运行到没有任何待执行工作
    ///
    /// 顺序：微任务检查点 → 动画帧 → 空闲回调 → 推进到下一个定时器。
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        for _ in 0..MAX_TURNS {
            ran += self.perform_microtask_checkpoint();
            if !self.frames.borrow().is_empty() {
                ran += self.run_animation_frame();
            } else if !self.idle.borrow().is_empty() {
                ran += self.run_idle_callbacks();
            } else if let Some(due) = self.next_timer_due() {
                ran += self.advance(due.saturating_sub(self.now.get()));
            } else {
                return ran;
            }
        }
        tracing::warn!("事件循环超过 {} 轮仍未空闲", MAX_TURNS);
        ran
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(HostCapabilities::default())
    }
}

impl TaskHost for EventLoop {
    fn queue_microtask(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }

    fn request_animation_frame(&self, task: Task) -> Result<(), Task> {
        if !self.capabilities.animation_frames {
            return Err(task);
        }
        self.frames.borrow_mut().push(task);
        Ok(())
    }

    fn request_idle_callback(&self, task: Task, timeout: Duration) -> Result<(), Task> {
        if !self.capabilities.idle_callbacks {
            return Err(task);
        }
        self.idle.borrow_mut().push(IdleCallback {
            deadline: self.now.get() + timeout,
            task,
        });
        Ok(())
    }

    fn set_timeout(&self, task: Task, delay: Duration) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now.get() + delay,
            seq,
            task,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_microtasks_run_before_frames_and_timers() {
        let event_loop = EventLoop::default();
        let (log, task) = log();

        event_loop.set_timeout(task("timer"), Duration::from_millis(50));
        assert!(event_loop.request_animation_frame(task("frame")).is_ok());
        event_loop.queue_microtask(task("micro"));
        event_loop.run_until_idle();

        assert_eq!(*log.borrow(), vec!["micro", "frame", "timer"]);
        assert_eq!(event_loop.now(), Duration::from_millis(50));
    }

    #[test]
    fn test_missing_capabilities_return_the_task() {
        let event_loop = EventLoop::new(HostCapabilities::timers_only());
        let (_log, task) = log();
        assert!(event_loop.request_animation_frame(task("frame")).is_err());
        assert!(event_loop
            .request_idle_callback(task("idle"), Duration::from_millis(200))
            .is_err());
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let event_loop = EventLoop::default();
        let (log, task) = log();
        event_loop.set_timeout(task("late"), Duration::from_millis(700));
        event_loop.set_timeout(task("early"), Duration::from_millis(0));
        event_loop.set_timeout(task("middle"), Duration::from_millis(50));

        assert_eq!(event_loop.advance(Duration::from_millis(60)), 2);
        assert_eq!(*log.borrow(), vec!["early", "middle"]);
        event_loop.run_until_idle();
        assert_eq!(*log.borrow(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_idle_callback_runs_at_timeout() {
        let event_loop = EventLoop::default();
        let (log, task) = log();
        assert!(event_loop
            .request_idle_callback(task("idle"), Duration::from_millis(200))
            .is_ok());
        event_loop.advance(Duration::from_millis(199));
        assert!(log.borrow().is_empty());
        event_loop.advance(Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec!["idle"]);
    }

    #[test]
    fn test_checkpoint_delivers_records() {
        use crate::document::{MutationRecord, ObserverOptions};
        use crate::parsers::html::dom::descendant_text_nodes;

        let event_loop = EventLoop::default();
        let doc = Rc::new(LiveDocument::parse("<p>x</p>").unwrap());
        event_loop.watch(&doc);
        doc.observe(&doc.body(), ObserverOptions::subtree_with_attributes(&[]));

        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        doc.set_observer_callback(Some(Rc::new(move |records: Vec<MutationRecord>| {
            counter.set(counter.get() + records.len());
        })));

        let text = descendant_text_nodes(&doc.body())[0].clone();
        doc.set_text(&text, "y").unwrap();
        assert!(event_loop.has_pending_work());
        event_loop.perform_microtask_checkpoint();
        assert_eq!(seen.get(), 1);
        assert!(!event_loop.has_pending_work());
    }
}
