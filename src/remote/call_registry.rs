//! 远程调用注册表。
//!
//! 记录存放在带代数的槽位里，句柄即完成令牌。会话销毁或管理性移除之后，
//! 迟到的完成通知会因代数不匹配而成为无操作，不会触碰已释放的记录。

use tracing::{debug, trace};

use super::call_record::CallRecord;
use super::models::{CallHandle, DEFAULT_QUEUE_NAME, RequestInfo};
use super::queue_router::QueueRouter;
use super::transport::{ChannelPool, TransferCompletion};
use crate::network::domain_policy::DomainPolicy;
use crate::script::{ScriptHost, SessionId};

#[derive(Debug)]
struct Slot {
    generation: u32,
    // 提交顺序，用于列举
    seq: u64,
    record: Option<CallRecord>,
}

#[derive(Debug)]
pub struct RemoteCalls {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
    router: QueueRouter,
}

impl RemoteCalls {
    pub fn new(queue_slots: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            live: 0,
            router: QueueRouter::new(queue_slots),
        }
    }

    /// 保存记录并立即提交到通道池；提交失败只会通过完成回调报告。
    pub fn submit(
        &mut self,
        record: CallRecord,
        pool: &mut dyn ChannelPool,
        domains: &dyn DomainPolicy,
    ) -> CallHandle {
        let handle = self.insert(record);
        let Self { slots, router, .. } = self;
        if let Some(record) = slots
            .get_mut(handle.index as usize)
            .and_then(|slot| slot.record.as_mut())
        {
            record.make_call(handle, router, pool, domains);
        }
        handle
    }

    fn insert(&mut self, record: CallRecord) -> CallHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.seq = seq;
            slot.record = Some(record);
            return CallHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            seq,
            record: Some(record),
        });
        CallHandle {
            index,
            generation: 0,
        }
    }

    fn get_mut_slot(&mut self, handle: CallHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.record.is_some())
    }

    /// 句柄是否仍指向存活的记录（代数比较，O(1)）。
    pub fn exists(&self, handle: CallHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: CallHandle) -> Option<&CallRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    /// 移除并销毁一条记录；句柄已失效时返回 false。
    pub fn remove(&mut self, handle: CallHandle) -> bool {
        let Some(slot) = self.get_mut_slot(handle) else {
            return false;
        };
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        true
    }

    /// 管理性中止：记录被销毁，传输层稍后的完成通知会被忽略。
    pub fn abort(&mut self, handle: CallHandle) -> bool {
        let removed = self.remove(handle);
        if removed {
            debug!(%handle, "远程调用已中止");
        }
        removed
    }

    /// 会话销毁时移除其全部记录，其他会话不受影响。
    pub fn remove_session(&mut self, session: SessionId) -> usize {
        let doomed: Vec<CallHandle> = self
            .handles()
            .filter(|h| self.get(*h).map(|r| r.session() == session).unwrap_or(false))
            .collect();
        for handle in &doomed {
            self.remove(*handle);
        }
        if !doomed.is_empty() {
            debug!(%session, removed = doomed.len(), "会话的远程调用已清理");
        }
        doomed.len()
    }

    fn handles(&self) -> impl Iterator<Item = CallHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.record.as_ref().map(|_| CallHandle {
                index: i as u32,
                generation: slot.generation,
            })
        })
    }

    /// 按提交顺序列出存活调用，可按会话过滤。
    pub fn requests(&self, session: Option<SessionId>) -> Vec<CallHandle> {
        let mut out: Vec<(u64, CallHandle)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let record = slot.record.as_ref()?;
                if session.is_some_and(|s| s != record.session()) {
                    return None;
                }
                Some((
                    slot.seq,
                    CallHandle {
                        index: i as u32,
                        generation: slot.generation,
                    },
                ))
            })
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        out.into_iter().map(|(_, h)| h).collect()
    }

    pub fn request_info(&self, handle: CallHandle) -> Option<RequestInfo> {
        self.get(handle).map(CallRecord::info)
    }

    /// 传输完成回调。
    ///
    /// 记录已不存在时静默返回 false：这是与会话销毁竞争的正常结果。
    /// 结果交付期间记录仍然存在，回调可以通过 `CallScope` 重入注册表；
    /// 交付之后才删除记录（回调已自行删除时为无操作）。
    pub fn on_download_finished(
        &mut self,
        completion: TransferCompletion,
        pool: &mut dyn ChannelPool,
        domains: &dyn DomainPolicy,
        host: &mut dyn ScriptHost,
    ) -> bool {
        let Some(record) = self.get(completion.token) else {
            trace!(token = %completion.token, "记录已不存在，忽略完成通知");
            return false;
        };

        let session = record.session();
        let callback = record.callback();
        let args = record.result_arguments(&completion.outcome);

        let mut scope = CallScope {
            calls: self,
            pool,
            domains,
        };
        host.call_function(&mut scope, session, callback, args);

        self.remove(completion.token);
        true
    }

    /// 每个 tick 调用一次：处理所有已映射槽位的两个通道并交付完成结果，
    /// 两个通道都空闲时回收该队列映射（默认队列除外）。
    pub fn process_queued_files(
        &mut self,
        pool: &mut dyn ChannelPool,
        domains: &dyn DomainPolicy,
        host: &mut dyn ScriptHost,
    ) {
        for (queue_name, index) in self.router.mappings() {
            let [restricted, any_host] = self.router.channels_for_index(index);

            let batch = pool.process_queued_files(restricted);
            let restricted_idle = batch.idle;
            for completion in batch.completed {
                self.on_download_finished(completion, pool, domains, host);
            }

            let batch = pool.process_queued_files(any_host);
            let any_host_idle = batch.idle;
            for completion in batch.completed {
                self.on_download_finished(completion, pool, domains, host);
            }

            if restricted_idle && any_host_idle && queue_name != DEFAULT_QUEUE_NAME {
                self.router.release(&queue_name);
            }
        }
    }

    pub fn router(&self) -> &QueueRouter {
        &self.router
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// 全部销毁（进程退出）。
    pub fn clear(&mut self) {
        let all: Vec<CallHandle> = self.handles().collect();
        for handle in all {
            self.remove(handle);
        }
    }
}

/// 结果回调期间对调用注册表的重入句柄。
pub struct CallScope<'a> {
    calls: &'a mut RemoteCalls,
    pool: &'a mut dyn ChannelPool,
    domains: &'a dyn DomainPolicy,
}

impl CallScope<'_> {
    /// 提交后续调用；它最早在下一次处理该通道时完成。
    pub fn submit(&mut self, record: CallRecord) -> CallHandle {
        self.calls.submit(record, self.pool, self.domains)
    }

    pub fn abort(&mut self, handle: CallHandle) -> bool {
        self.calls.abort(handle)
    }

    /// 同一批次里属于该会话、尚未交付的完成通知随之作废。
    pub fn remove_session(&mut self, session: SessionId) -> usize {
        self.calls.remove_session(session)
    }

    pub fn exists(&self, handle: CallHandle) -> bool {
        self.calls.exists(handle)
    }

    pub fn requests(&self, session: Option<SessionId>) -> Vec<CallHandle> {
        self.calls.requests(session)
    }
}
