//! 变更调度器
//!
//! 负责两件事：
//! - 把一批变更记录分类为立即处理的节点与延后处理的节点，并判断是否升级为紧急处理
//! - 维护待处理集合与调度状态（空闲 / 已排批量 / 已排紧急）
//!
//! 每次排程都会分配一个新的票据。任务执行时只有持有当前票据才会生效，
//! 被紧急排程取代或被 `reset` 作废的任务直接忽略。

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::document::MutationRecord;
use crate::parsers::html::dom::{child_element_count, is_element, is_text, text_content, NodeId};
use crate::substitution::config::Settings;

/// 调度票据
pub type Ticket = u64;

/// 调度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    BatchedScheduled(Ticket),
    UrgentScheduled(Ticket),
}

impl SchedulerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SchedulerState::Idle)
    }
}

/// 待处理节点集合，按加入顺序保存，重复加入无效
#[derive(Debug, Default)]
pub struct PendingSet {
    nodes: Vec<Handle>,
    ids: HashSet<NodeId>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入节点；已存在时返回 `false`
    pub fn insert(&mut self, node: &Handle) -> bool {
        if !self.ids.insert(NodeId::of(node)) {
            return false;
        }
        self.nodes.push(node.clone());
        true
    }

    pub fn contains(&self, node: &Handle) -> bool {
        self.ids.contains(&NodeId::of(node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 取出全部节点并清空集合
    pub fn take(&mut self) -> Vec<Handle> {
        self.ids.clear();
        std::mem::take(&mut self.nodes)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ids.clear();
    }
}

/// 一批变更记录的分类结果
#[derive(Debug, Default)]
pub struct Classification {
    /// 需要在回调内立即处理的节点
    pub immediate: Vec<Handle>,
    /// 加入待处理集合的节点
    pub deferred: Vec<Handle>,
    /// 小型变更数
    pub small: usize,
    /// 记录总数
    pub records: usize,
}

impl Classification {
    /// 批次过大时升级为紧急处理
    pub fn should_escalate(&self, settings: &Settings) -> bool {
        self.records > settings.batch_record_limit || self.small > settings.batch_small_limit
    }
}

/// 对变更记录分类
///
/// - 文本变化与属性变化：延后，计为小型变更
/// - 新增文本节点：立即处理，计为小型变更
/// - 新增元素：没有子元素或文本少于上限时立即处理（计为小型变更），否则延后
/// - 其它新增节点：延后
/// - 只有删除的子节点变化不产生任何工作
pub fn classify(records: &[MutationRecord], settings: &Settings) -> Classification {
    let mut out = Classification {
        records: records.len(),
        ..Default::default()
    };

    for record in records {
        match record {
            MutationRecord::CharacterData { target } | MutationRecord::Attributes { target, .. } => {
                out.deferred.push(target.clone());
                out.small += 1;
            }
            MutationRecord::ChildList { added, .. } => {
                for node in added {
                    if is_text(node) {
                        out.immediate.push(node.clone());
                        out.small += 1;
                    } else if is_element(node) {
                        if child_element_count(node) == 0
                            || text_content(node).chars().count() < settings.urgent_text_limit
                        {
                            out.immediate.push(node.clone());
                            out.small += 1;
                        } else {
                            out.deferred.push(node.clone());
                        }
                    } else {
                        out.deferred.push(node.clone());
                    }
                }
            }
        }
    }

    out
}

/// 调度器：待处理集合 + 状态机
#[derive(Debug)]
pub struct Scheduler {
    pending: PendingSet,
    state: SchedulerState,
    next_ticket: Ticket,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pending: PendingSet::new(),
            state: SchedulerState::Idle,
            next_ticket: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn enqueue(&mut self, node: &Handle) -> bool {
        self.pending.insert(node)
    }

    fn issue(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// 请求批量处理；已有任何排程时返回 `None`
    pub fn request_batched(&mut self) -> Option<Ticket> {
        if !self.state.is_idle() {
            return None;
        }
        let ticket = self.issue();
        self.state = SchedulerState::BatchedScheduled(ticket);
        Some(ticket)
    }

    /// 请求紧急处理；已排紧急时返回 `None`，已排批量时取代它
    pub fn request_urgent(&mut self) -> Option<Ticket> {
        if matches!(self.state, SchedulerState::UrgentScheduled(_)) {
            return None;
        }
        let ticket = self.issue();
        self.state = SchedulerState::UrgentScheduled(ticket);
        Some(ticket)
    }

    /// 任务开始执行：票据有效时回到空闲并返回 `true`
    pub fn begin(&mut self, ticket: Ticket) -> bool {
        match self.state {
            SchedulerState::BatchedScheduled(current) | SchedulerState::UrgentScheduled(current)
                if current == ticket =>
            {
                self.state = SchedulerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// 取出本轮待处理节点
    pub fn take_pending(&mut self) -> Vec<Handle> {
        self.pending.take()
    }

    /// 清空待处理集合并作废所有已排任务
    pub fn reset(&mut self) {
        self.pending.clear();
        self.state = SchedulerState::Idle;
        self.next_ticket += 1;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
