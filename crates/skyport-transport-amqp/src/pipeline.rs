//! # 出站事件管线
//!
//! ## 核心意图（Why）
//! - 设备处于 `Started` 时，每个 Tick 按 FIFO 顺序把队列中的事件提交给协作方；
//! - 协作方的完成原因被归约为四种对外结果，并驱动设备的发送完成失败计数。
//!
//! ## 行为契约（What）
//! - 提交同步失败时，该事件立即以 `Error` 完成，本 Tick 停止排空；其余事件保持原有顺序，
//!   下一 Tick 继续；
//! - 除 `Ok` 与 `DestroyedDuringTeardown` 外的完成结果使计数加一，这两者使计数清零；
//! - 回调（若存在）恰好执行一次，负载无论是否有回调都恰好释放一次。

use skyport_core::{OutboundEvent, SendConfirmation};
use skyport_core::collaborators::SubmissionToken;
use tracing::{error, trace, warn};

use crate::device::DeviceEntry;
use crate::error::SendFailure;

impl DeviceEntry {
    /// 排空出站队列。
    pub(crate) fn send_pending(&mut self) -> Result<(), SendFailure> {
        while let Some(event) = self.queue.pop_front() {
            let token = self.allocate_token();
            let payload = event.payload().clone();
            match self.device_mut().send_event_async(token, payload) {
                Ok(()) => {
                    trace!(device_id = %self.id(), token = token.raw(), "event submitted");
                    self.in_flight.insert(token, event);
                }
                Err(source) => {
                    error!(device_id = %self.id(), error = %source, "failed to submit event");
                    self.finish(event, SendConfirmation::Error);
                    return Err(SendFailure::Submission {
                        device_id: self.id().to_owned(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// 处理协作方的完成通知。
    pub(crate) fn on_send_completed(
        &mut self,
        token: SubmissionToken,
        confirmation: SendConfirmation,
    ) {
        match self.in_flight.remove(&token) {
            Some(event) => self.finish(event, confirmation),
            None => warn!(
                device_id = %self.id(),
                token = token.raw(),
                "completion received for an unknown submission"
            ),
        }
    }

    fn finish(&mut self, event: OutboundEvent, confirmation: SendConfirmation) {
        if confirmation.counts_as_failure() {
            self.failures.send_completion += 1;
        } else {
            self.failures.send_completion = 0;
        }
        event.complete(confirmation);
    }
}
