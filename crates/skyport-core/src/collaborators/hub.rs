use crate::message::InboundMessage;

/// 把入站消息交给应用代码的 Hub 客户端回调。
///
/// - **意图 (Why)**：应用可能暂时无法接收（例如未注册消息回调），此时消息必须原样退回，
///   由编排层立即释放并视为“已释放”处置；
/// - **契约 (What)**：接受时返回 `Ok(())`，此后应用负责以处置意见回传；拒绝时返回
///   `Err(message)` 交还所有权。
pub trait HubClientSink: Send + Sync {
    /// 投递入站消息。
    fn deliver_inbound_message(&self, message: InboundMessage) -> Result<(), InboundMessage>;
}
