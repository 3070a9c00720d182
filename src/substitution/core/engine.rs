//! 替换引擎核心实现
//!
//! 引擎把各个组件串联起来：
//!
//! ## 主要功能
//! - **启用**: 合并词典，立即完整遍历一次，排一次批量处理，连接观察器并注册导航回调
//! - **变更处理**: 对每批变更记录分类，小型新增节点在回调内立即处理，其余进入待处理集合
//! - **调度**: 紧急处理在微任务中执行；批量处理依次尝试动画帧、空闲回调、短定时器
//! - **停用**: 断开观察器，清空待处理集合，可选地回滚全部修改
//!
//! 处理期间观察器总是断开的，引擎自身的写入不会再触发变更回调。

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use markup5ever_rcdom::Handle;

use crate::document::{LiveDocument, MutationRecord, ObserverOptions};
use crate::host::{Task, TaskHost};
use crate::parsers::html::dom::is_inclusive_descendant;
use crate::substitution::config::{EnableConfig, Settings};
use crate::substitution::core::navigation::NavigationObserver;
use crate::substitution::core::scheduler::{classify, Scheduler, SchedulerState, Ticket};
use crate::substitution::dictionary::Dictionary;
use crate::substitution::pipeline::{compile, EligibilityFilter, MatcherSet, Translator, WalkReport};
use crate::substitution::storage::OriginalStore;

/// 引擎统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// 执行的紧急处理次数
    pub urgent_passes: usize,
    /// 执行的批量处理次数
    pub batched_passes: usize,
    /// 完整遍历次数
    pub full_walks: usize,
    /// 定向遍历的节点数
    pub targeted_nodes: usize,
    /// 在变更回调内立即处理的节点数
    pub immediate_translations: usize,
    /// 写入的替换数
    pub substitutions: usize,
    /// 回滚写回的原值数
    pub restored: usize,
    /// 被忽略的过期任务数
    pub stale_tasks: usize,
}

impl EngineStats {
    fn absorb(&mut self, report: &WalkReport) {
        self.substitutions += report.substitutions;
    }
}

struct EngineState {
    enabled: bool,
    /// 每次启用递增，旧周期的任务据此失效
    epoch: u64,
    dictionary: Dictionary,
    matchers: MatcherSet,
    originals: OriginalStore,
    scheduler: Scheduler,
    navigation_active: bool,
    navigation_seq: u64,
    stats: EngineStats,
}

/// 处理期间断开观察器，离开作用域时重新连接
struct ObserverPause<'a> {
    document: &'a LiveDocument,
    root: Handle,
    options: ObserverOptions,
}

impl Drop for ObserverPause<'_> {
    fn drop(&mut self) {
        self.document.observe(&self.root, self.options.clone());
    }
}

/// 替换引擎
pub struct Engine {
    document: Rc<LiveDocument>,
    host: Rc<dyn TaskHost>,
    settings: Settings,
    filter: EligibilityFilter,
    navigation: RefCell<Option<Rc<dyn NavigationObserver>>>,
    state: RefCell<EngineState>,
    this: Weak<Engine>,
}

impl Engine {
    /// 创建引擎；`settings.mapping` 作为初始词典
    pub fn new(document: Rc<LiveDocument>, host: Rc<dyn TaskHost>, settings: Settings) -> Rc<Self> {
        let dictionary = settings.mapping.clone();
        let matchers = compile(&dictionary);
        let filter = EligibilityFilter::new(settings.long_text_threshold);

        Rc::new_cyclic(|this| Engine {
            document,
            host,
            filter,
            navigation: RefCell::new(None),
            state: RefCell::new(EngineState {
                enabled: false,
                epoch: 0,
                dictionary,
                matchers,
                originals: OriginalStore::new(),
                scheduler: Scheduler::new(),
                navigation_active: false,
                navigation_seq: 0,
                stats: EngineStats::default(),
            }),
            settings,
            this: this.clone(),
        })
    }

    /// 设置导航观察者；引擎已启用时立即注册
    pub fn set_navigation(&self, navigation: Rc<dyn NavigationObserver>) {
        if let Some(previous) = self.navigation.borrow_mut().replace(navigation) {
            previous.unregister();
        }
        if self.is_enabled() {
            self.register_navigation();
        }
    }

    pub fn document(&self) -> &Rc<LiveDocument> {
        &self.document
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 调试用：配置的长文本阈值
    pub fn long_text_threshold(&self) -> usize {
        self.filter.threshold()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub fn stats(&self) -> EngineStats {
        self.state.borrow().stats.clone()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.state.borrow().scheduler.state()
    }

    pub fn pending_len(&self) -> usize {
        self.state.borrow().scheduler.pending().len()
    }

    pub fn is_navigation_active(&self) -> bool {
        self.state.borrow().navigation_active
    }

    pub fn dictionary(&self) -> Ref<'_, Dictionary> {
        Ref::map(self.state.borrow(), |state| &state.dictionary)
    }

    pub fn recorded_originals(&self) -> usize {
        self.state.borrow().originals.len()
    }

    // ------------------------------------------------------------------
    // 控制接口
    // ------------------------------------------------------------------

    /// 启用引擎
    ///
    /// 已启用时只合并词典。
    pub fn enable(&self, config: EnableConfig) {
        if !config.merge_mapping.is_empty() {
            self.merge_dictionary(config.merge_mapping);
        }

        {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if state.enabled {
                return;
            }
            state.enabled = true;
            state.epoch += 1;

            let body = self.document.body();
            let report = self.translator_walk(state, |t| t.walk(&body));
            state.stats.full_walks += 1;
            state.stats.absorb(&report);

            state.scheduler.enqueue(&body);
            if let Some(ticket) = state.scheduler.request_batched() {
                self.dispatch_batched(state.epoch, ticket);
            }

            tracing::info!(
                "替换引擎已启用：{} 个词条，首次遍历写入 {} 处",
                state.matchers.len(),
                report.substitutions
            );
        }

        let callback_target = self.this.clone();
        self.document
            .set_observer_callback(Some(Rc::new(move |records: Vec<MutationRecord>| {
                if let Some(engine) = callback_target.upgrade() {
                    engine.on_mutations(records);
                }
            })));
        self.document.observe(&self.document.body(), self.observer_options());
        self.register_navigation();
    }

    /// 停用引擎；`restore_originals` 为真时回滚全部修改
    pub fn disable(&self, restore_originals: bool) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.enabled {
            return;
        }
        state.enabled = false;
        self.document.disconnect();
        self.document.set_observer_callback(None);
        state.scheduler.reset();
        state.navigation_active = false;

        if let Some(navigation) = self.navigation.borrow().as_ref() {
            navigation.unregister();
        }

        if restore_originals {
            let report = state.originals.restore_all(&self.document);
            state.stats.restored += report.restored;
        }

        tracing::info!("替换引擎已停用（回滚: {}）", restore_originals);
    }

    /// 合并词条并重新编译；不改变启用状态
    pub fn rebuild(&self, mapping: Dictionary) {
        if mapping.is_empty() {
            return;
        }
        self.merge_dictionary(mapping);
    }

    fn merge_dictionary(&self, mapping: Dictionary) {
        let mut state = self.state.borrow_mut();
        state.dictionary.merge(mapping);
        state.matchers = compile(&state.dictionary);
        tracing::debug!("词典已重新编译：{} 个匹配器", state.matchers.len());
    }

    // ------------------------------------------------------------------
    // 变更与导航入口
    // ------------------------------------------------------------------

    /// 观察器回调
    pub fn on_mutations(&self, records: Vec<MutationRecord>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.enabled {
            return;
        }

        let class = classify(&records, &self.settings);

        for node in class.deferred.iter() {
            if !self.filter.is_inside_skip_tag(node) {
                state.scheduler.enqueue(node);
            }
        }

        let immediate: Vec<Handle> = class
            .immediate
            .iter()
            .filter(|node| !self.filter.is_inside_skip_tag(node))
            .cloned()
            .collect();
        if !immediate.is_empty() {
            let report = self.translator_walk(state, |t| {
                for node in immediate.iter() {
                    t.translate_targeted(node);
                }
            });
            state.stats.immediate_translations += immediate.len();
            state.stats.absorb(&report);
        }

        let escalate = class.should_escalate(&self.settings) || state.navigation_active;
        tracing::trace!(
            "变更批次：{} 条记录，{} 个小型变更，升级: {}",
            class.records,
            class.small,
            escalate
        );
        self.schedule(state, escalate);
    }

    /// 路由变化：立即完整遍历并排一次紧急处理，同时进入冷却期
    pub fn on_route_change(&self) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.enabled {
            return;
        }

        state.navigation_active = true;
        state.navigation_seq += 1;
        let (epoch, sequence) = (state.epoch, state.navigation_seq);
        let cooldown = self.task(move |engine| engine.end_navigation_cooldown(epoch, sequence));
        self.host.set_timeout(cooldown, self.settings.navigation_cooldown());

        let body = self.document.body();
        let report = self.translator_walk(state, |t| t.walk(&body));
        state.stats.full_walks += 1;
        state.stats.absorb(&report);

        state.scheduler.enqueue(&body);
        self.schedule(state, true);
        tracing::debug!("路由变化：完整遍历写入 {} 处", report.substitutions);
    }

    fn end_navigation_cooldown(&self, epoch: u64, sequence: u64) {
        let mut state = self.state.borrow_mut();
        if state.epoch == epoch && state.navigation_seq == sequence {
            state.navigation_active = false;
        }
    }

    // ------------------------------------------------------------------
    // 调度
    // ------------------------------------------------------------------

    fn schedule(&self, state: &mut EngineState, urgent: bool) {
        let epoch = state.epoch;
        if urgent {
            if let Some(ticket) = state.scheduler.request_urgent() {
                let task = self.task(move |engine| engine.run_scheduled(epoch, ticket, true));
                self.host.queue_microtask(task);
            }
        } else if let Some(ticket) = state.scheduler.request_batched() {
            self.dispatch_batched(epoch, ticket);
        }
    }

    /// 动画帧 → 空闲回调 → 短定时器
    fn dispatch_batched(&self, epoch: u64, ticket: Ticket) {
        let task = self.task(move |engine| engine.run_scheduled(epoch, ticket, false));
        let Err(task) = self.host.request_animation_frame(task) else {
            return;
        };
        let Err(task) = self
            .host
            .request_idle_callback(task, self.settings.idle_timeout())
        else {
            return;
        };
        self.host.set_timeout(task, self.settings.fallback_delay());
    }

    fn task<F>(&self, f: F) -> Task
    where
        F: FnOnce(&Engine) + 'static,
    {
        let this = self.this.clone();
        Box::new(move || {
            if let Some(engine) = this.upgrade() {
                f(&engine);
            }
        })
    }

    /// 执行已排的处理任务；过期任务直接忽略
    pub(crate) fn run_scheduled(&self, epoch: u64, ticket: Ticket, urgent: bool) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.enabled || state.epoch != epoch || !state.scheduler.begin(ticket) {
            state.stats.stale_tasks += 1;
            tracing::trace!("忽略过期任务 (epoch {}, ticket {})", epoch, ticket);
            return;
        }

        if urgent {
            state.stats.urgent_passes += 1;
        } else {
            state.stats.batched_passes += 1;
        }
        self.process_pending(state, urgent);
    }

    /// 处理待处理集合；强制或集合为空时对 body 做完整遍历
    fn process_pending(&self, state: &mut EngineState, force: bool) {
        let body = self.document.body();
        let _pause = self.pause_observer(state);
        let nodes = state.scheduler.take_pending();

        let report = if force || nodes.is_empty() {
            state.stats.full_walks += 1;
            self.translator(state, |t| t.walk(&body))
        } else {
            state.stats.targeted_nodes += nodes.len();
            self.translator(state, |t| {
                for node in nodes.iter() {
                    t.translate_targeted(node);
                }
            })
        };
        state.stats.absorb(&report);

        tracing::debug!(
            "{}处理完成：写入 {} 处，跳过 {} 个候选",
            if force { "紧急" } else { "批量" },
            report.substitutions,
            report.skipped.values().sum::<usize>()
        );
    }

    /// 断开观察器；尚未交付的记录先并入待处理集合
    fn pause_observer(&self, state: &mut EngineState) -> Option<ObserverPause<'_>> {
        if !self.document.is_observing() {
            return None;
        }

        let body = self.document.body();
        for record in self.document.take_records() {
            let nodes = match record {
                MutationRecord::CharacterData { target }
                | MutationRecord::Attributes { target, .. } => vec![target],
                MutationRecord::ChildList { added, .. } => added,
            };
            for node in nodes {
                if is_inclusive_descendant(&node, &body) && !self.filter.is_inside_skip_tag(&node) {
                    state.scheduler.enqueue(&node);
                }
            }
        }

        self.document.disconnect();
        Some(ObserverPause {
            document: &self.document,
            root: body,
            options: self.observer_options(),
        })
    }

    /// 在暂停观察器的情况下执行一次遍历
    fn translator_walk<F>(&self, state: &mut EngineState, f: F) -> WalkReport
    where
        F: FnOnce(&mut Translator<'_>),
    {
        let _pause = self.pause_observer(state);
        self.translator(state, f)
    }

    fn translator<F>(&self, state: &mut EngineState, f: F) -> WalkReport
    where
        F: FnOnce(&mut Translator<'_>),
    {
        let mut translator = Translator::new(
            &self.document,
            &state.matchers,
            &self.filter,
            &mut state.originals,
        )
        .with_attributes(&self.settings.translatable_attributes)
        .with_fanout_limit(self.settings.fanout_limit);
        f(&mut translator);
        translator.into_report()
    }

    fn observer_options(&self) -> ObserverOptions {
        ObserverOptions::subtree_with_attributes(&self.settings.translatable_attributes)
    }

    fn register_navigation(&self) {
        let Some(navigation) = self.navigation.borrow().clone() else {
            return;
        };
        let target = self.this.clone();
        navigation.register(Rc::new(move || {
            if let Some(engine) = target.upgrade() {
                engine.on_route_change();
            }
        }));
    }
}
