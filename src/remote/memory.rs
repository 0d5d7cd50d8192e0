//! 手动完成的内存通道池，用于嵌入方自测与离线回放。

use std::collections::{BTreeMap, VecDeque};

use super::models::{CallHandle, ChannelId};
use super::transport::{
    ChannelBatch, ChannelPool, TransferCompletion, TransferOutcome, TransferRequest,
};

#[derive(Debug, Default)]
struct MemoryChannel {
    pending: Vec<TransferRequest>,
    finished: VecDeque<TransferCompletion>,
    processed_ticks: usize,
}

/// 传输不会自己完成，需要调用 `complete` / `fail` 手动结束。
#[derive(Debug, Default)]
pub struct MemoryChannelPool {
    channels: BTreeMap<ChannelId, MemoryChannel>,
}

impl MemoryChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该通道上尚未完成的请求。
    pub fn pending(&self, channel: ChannelId) -> &[TransferRequest] {
        self.channels
            .get(&channel)
            .map(|c| c.pending.as_slice())
            .unwrap_or(&[])
    }

    pub fn find(&self, token: CallHandle) -> Option<(ChannelId, &TransferRequest)> {
        self.channels.iter().find_map(|(id, ch)| {
            ch.pending
                .iter()
                .find(|t| t.token == token)
                .map(|t| (*id, t))
        })
    }

    pub fn complete(&mut self, token: CallHandle, body: impl Into<Vec<u8>>) -> bool {
        self.finish(token, TransferOutcome::Success(body.into()))
    }

    pub fn fail(&mut self, token: CallHandle, code: i32) -> bool {
        self.finish(token, TransferOutcome::Failed { code })
    }

    pub fn finish(&mut self, token: CallHandle, outcome: TransferOutcome) -> bool {
        for channel in self.channels.values_mut() {
            if let Some(pos) = channel.pending.iter().position(|t| t.token == token) {
                channel.pending.remove(pos);
                channel
                    .finished
                    .push_back(TransferCompletion { token, outcome });
                return true;
            }
        }
        false
    }

    /// 某个通道被 tick 处理过的次数。
    pub fn processed_ticks(&self, channel: ChannelId) -> usize {
        self.channels
            .get(&channel)
            .map(|c| c.processed_ticks)
            .unwrap_or(0)
    }
}

impl ChannelPool for MemoryChannelPool {
    fn queue_file(&mut self, channel: ChannelId, transfer: TransferRequest) {
        self.channels.entry(channel).or_default().pending.push(transfer);
    }

    fn process_queued_files(&mut self, channel: ChannelId) -> ChannelBatch {
        let ch = self.channels.entry(channel).or_default();
        ch.processed_ticks += 1;
        ChannelBatch {
            completed: ch.finished.drain(..).collect(),
            idle: ch.pending.is_empty(),
        }
    }
}
