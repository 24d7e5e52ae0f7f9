//! 时间抽象：编排层的所有超时判断都通过可注入的 [`Clock`] 完成。
//!
//! - 生产路径使用 [`SystemClock`]；
//! - 测试路径使用 [`MockClock`]，可手动推进时间，也可模拟“读取时钟失败”。

mod clock;

pub use clock::{Clock, ClockError, MockClock, SystemClock, elapsed_since};
