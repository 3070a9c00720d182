//! 导航信号
//!
//! 引擎只依赖 `NavigationObserver`：启用时注册回调，停用时注销。
//! `HistoryNavigation` 是供集成方使用的现成实现，由宿主在路由变化时调用其方法。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use url::Url;

use crate::host::{Task, TaskHost};
use crate::substitution::error::{SubstitutionError, SubstitutionResult};

/// 路由变化回调
pub type NavigationCallback = Rc<dyn Fn()>;

/// 导航观察者
pub trait NavigationObserver {
    /// 注册回调，替换之前注册的回调
    fn register(&self, callback: NavigationCallback);

    fn unregister(&self);

    fn is_registered(&self) -> bool;
}

/// 当前注册的回调及其注册代数
#[derive(Default)]
struct Registration {
    generation: Cell<u64>,
    callback: RefCell<Option<NavigationCallback>>,
}

impl Registration {
    /// 在任务执行时取回调：期间注销或重新注册过则放弃
    fn fire(&self, generation: u64) {
        if self.generation.get() != generation {
            return;
        }
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// 基于 history 语义的导航观察者
pub struct HistoryNavigation {
    host: Rc<dyn TaskHost>,
    location: RefCell<Url>,
    registration: Rc<Registration>,
}

impl HistoryNavigation {
    /// 以页面初始地址创建
    pub fn new(host: Rc<dyn TaskHost>, location: &str) -> SubstitutionResult<Self> {
        let location = Url::parse(location).map_err(|e| {
            SubstitutionError::ConfigError(format!("invalid location '{}': {}", location, e))
        })?;
        Ok(Self {
            host,
            location: RefCell::new(location),
            registration: Rc::new(Registration::default()),
        })
    }

    pub fn location(&self) -> Url {
        self.location.borrow().clone()
    }

    fn resolve(&self, href: &str) -> SubstitutionResult<Url> {
        self.location
            .borrow()
            .join(href)
            .map_err(|e| SubstitutionError::ConfigError(format!("invalid url '{}': {}", href, e)))
    }

    fn same_origin(&self, url: &Url) -> bool {
        self.location.borrow().origin() == url.origin()
    }

    /// `history.pushState`
    pub fn push_state(&self, href: &str) -> SubstitutionResult<()> {
        self.navigate(href)
    }

    /// `history.replaceState`
    pub fn replace_state(&self, href: &str) -> SubstitutionResult<()> {
        self.navigate(href)
    }

    /// `popstate` 事件
    pub fn pop_state(&self, href: &str) -> SubstitutionResult<()> {
        self.navigate(href)
    }

    /// `hashchange` 事件
    pub fn hash_change(&self, fragment: &str) -> SubstitutionResult<()> {
        let fragment = fragment.trim_start_matches('#');
        self.location.borrow_mut().set_fragment(Some(fragment));
        self.notify_soon();
        Ok(())
    }

    /// 点击链接；只有同源链接会在零延迟定时器之后通知
    pub fn link_click(&self, href: &str) -> bool {
        let url = match self.resolve(href) {
            Ok(url) => url,
            Err(error) => {
                tracing::debug!("忽略无法解析的链接: {}", error);
                return false;
            }
        };
        if !self.same_origin(&url) {
            return false;
        }
        if let Some(task) = self.pending_notification() {
            self.host.set_timeout(task, Duration::ZERO);
        }
        true
    }

    fn navigate(&self, href: &str) -> SubstitutionResult<()> {
        let url = self.resolve(href)?;
        if !self.same_origin(&url) {
            return Err(SubstitutionError::ConfigError(format!(
                "history entry '{}' is not same-origin",
                url
            )));
        }
        *self.location.borrow_mut() = url;
        self.notify_soon();
        Ok(())
    }

    fn notify_soon(&self) {
        if let Some(task) = self.pending_notification() {
            self.host.queue_microtask(task);
        }
    }

    /// 绑定到当前注册的通知任务；未注册时为 `None`
    fn pending_notification(&self) -> Option<Task> {
        if !self.is_registered() {
            return None;
        }
        let registration = self.registration.clone();
        let generation = registration.generation.get();
        Some(Box::new(move || registration.fire(generation)))
    }
}

impl NavigationObserver for HistoryNavigation {
    fn register(&self, callback: NavigationCallback) {
        let registration = &self.registration;
        registration.generation.set(registration.generation.get() + 1);
        *registration.callback.borrow_mut() = Some(callback);
    }

    fn unregister(&self) {
        let registration = &self.registration;
        registration.generation.set(registration.generation.get() + 1);
        registration.callback.borrow_mut().take();
    }

    fn is_registered(&self) -> bool {
        self.registration.callback.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::EventLoop;
    use std::cell::Cell;

    fn setup() -> (Rc<EventLoop>, HistoryNavigation, Rc<Cell<usize>>) {
        let event_loop = Rc::new(EventLoop::default());
        let nav = HistoryNavigation::new(event_loop.clone(), "https://app.example.com/home").unwrap();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        nav.register(Rc::new(move || counter.set(counter.get() + 1)));
        (event_loop, nav, count)
    }

    #[test]
    fn test_history_changes_notify_in_microtask() {
        let (event_loop, nav, count) = setup();
        nav.push_state("/settings").unwrap();
        nav.replace_state("/settings?tab=2").unwrap();
        nav.hash_change("#top").unwrap();
        assert_eq!(count.get(), 0);

        event_loop.perform_microtask_checkpoint();
        assert_eq!(count.get(), 3);
        assert_eq!(nav.location().as_str(), "https://app.example.com/settings?tab=2#top");
    }

    #[test]
    fn test_cross_origin_push_is_rejected() {
        let (_event_loop, nav, _count) = setup();
        assert!(nav.push_state("https://other.example.com/").is_err());
    }

    #[test]
    fn test_only_same_origin_clicks_notify() {
        let (event_loop, nav, count) = setup();
        assert!(!nav.link_click("https://elsewhere.org/page"));
        assert!(nav.link_click("/gallery"));

        event_loop.perform_microtask_checkpoint();
        assert_eq!(count.get(), 0);
        event_loop.advance(Duration::ZERO);
        assert_eq!(count.get(), 1);
    }

    /// 点击后注销再注册，零延迟定时器到期时不会调用新的回调
    #[test]
    fn test_click_before_reregister_is_dropped() {
        let (event_loop, nav, count) = setup();
        assert!(nav.link_click("/gallery"));
        nav.push_state("/files").unwrap();

        nav.unregister();
        let fresh = Rc::new(Cell::new(0));
        let counter = fresh.clone();
        nav.register(Rc::new(move || counter.set(counter.get() + 1)));
        event_loop.run_until_idle();
        assert_eq!(count.get(), 0);
        assert_eq!(fresh.get(), 0);

        assert!(nav.link_click("/gallery"));
        event_loop.run_until_idle();
        assert_eq!(fresh.get(), 1);
    }

    #[test]
    fn test_unregister_silences_notifications() {
        let (event_loop, nav, count) = setup();
        nav.unregister();
        assert!(!nav.is_registered());
        nav.pop_state("/back").unwrap();
        event_loop.run_until_idle();
        assert_eq!(count.get(), 0);
    }
}
