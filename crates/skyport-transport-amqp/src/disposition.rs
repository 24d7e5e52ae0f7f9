//! # 入站处置
//!
//! ## 核心意图（Why）
//! - 设备收到云端消息后，编排层附加处置上下文并交给应用；应用稍后给出意见，编排层再把意见
//!   翻译为协议层投递结果回传给设备；
//! - 若应用当下无法接收，消息立即释放，投递以“已释放”结束，此后不再接受该消息的处置请求。
//!
//! ## 行为契约（What）
//! - 意见映射：`Accepted → Accepted`、`Abandoned → Released`、`Rejected → Rejected`；
//! - 处置请求按值消费消息与上下文：无论成功、参数非法还是协作方失败，二者都在本次调用内
//!   恰好释放一次，不会留给协议层二次释放。

use std::sync::Arc;

use bytes::Bytes;
use skyport_core::collaborators::{HubClientSink, InboundDelivery, InboundHandler, ReceiveOutcome};
use skyport_core::{DeliveryOutcome, DispositionContext, InboundMessage, MessageVerdict};
use tracing::{debug, warn};

use crate::device::DeviceEntry;
use crate::error::DispositionError;

/// 构造设备收到入站投递时调用的处理器。
pub(crate) fn inbound_handler(device_id: Arc<str>, sink: Arc<dyn HubClientSink>) -> InboundHandler {
    Box::new(move |delivery: InboundDelivery| {
        let InboundDelivery {
            payload,
            link_name,
            delivery_id,
        } = delivery;
        let context = DispositionContext::new(Arc::clone(&device_id), link_name, delivery_id);
        match sink.deliver_inbound_message(InboundMessage::new(Some(payload), Some(context))) {
            Ok(()) => {
                debug!(device_id = %device_id, delivery_id, "inbound message handed to client");
                ReceiveOutcome::Deferred
            }
            Err(rejected) => {
                warn!(
                    device_id = %device_id,
                    delivery_id,
                    "client did not accept inbound message; releasing delivery"
                );
                drop(rejected);
                ReceiveOutcome::Released
            }
        }
    })
}

/// 拆出处置所需的两部分；缺失任一部分即为参数非法。
pub(crate) fn split(message: InboundMessage) -> Result<(Bytes, DispositionContext), DispositionError> {
    match message.into_parts() {
        (_, None) => Err(DispositionError::MissingContext),
        (None, Some(_)) => Err(DispositionError::MissingMessage),
        (Some(payload), Some(context)) => Ok((payload, context)),
    }
}

impl DeviceEntry {
    /// 把应用意见回传给协作方。
    pub(crate) fn acknowledge(
        &mut self,
        context: &DispositionContext,
        verdict: MessageVerdict,
    ) -> Result<(), DispositionError> {
        let outcome = DeliveryOutcome::from(verdict);
        self.device_mut()
            .send_disposition(context.link_name(), context.delivery_id(), outcome)
            .map_err(|source| DispositionError::Acknowledgment {
                device_id: context.device_id().to_owned(),
                delivery_id: context.delivery_id(),
                source,
            })?;
        debug!(
            device_id = %context.device_id(),
            delivery_id = context.delivery_id(),
            ?outcome,
            "disposition sent"
        );
        Ok(())
    }
}
