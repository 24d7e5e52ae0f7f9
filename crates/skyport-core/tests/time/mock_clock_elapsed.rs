pub mod mock_clock_elapsed {
    //! `MockClock` 与 `elapsed_since` 的行为：共享时间线、读取失败与缺失起点。

    use std::time::Duration;

    use proptest::prelude::*;
    use skyport_core::time::{Clock, MockClock, SystemClock, elapsed_since};

    /// 克隆体共享时间线：被测对象持有一个克隆，测试推进另一个。
    #[test]
    fn clones_observe_the_same_timeline() {
        let clock = MockClock::new();
        let injected = clock.clone();
        let start = injected.now().expect("mock clock readable");

        clock.advance(Duration::from_secs(61));

        let elapsed = elapsed_since(&injected, Some(start)).expect("elapsed computable");
        assert_eq!(elapsed, Duration::from_secs(61));
        assert_eq!(clock.elapsed(), Duration::from_secs(61));
    }

    /// 时钟不可用时，读取与差值计算都必须失败，调用方据此走悲观分支。
    #[test]
    fn unavailable_clock_fails_every_read() {
        let clock = MockClock::new();
        let start = clock.now().expect("readable before toggle");
        clock.set_unavailable(true);

        assert!(clock.now().is_err());
        assert!(elapsed_since(&clock, Some(start)).is_err());

        clock.set_unavailable(false);
        assert!(elapsed_since(&clock, Some(start)).is_ok());
    }

    /// 未记录起点等同于时钟失败。
    #[test]
    fn missing_start_is_a_clock_error() {
        let err = elapsed_since(&SystemClock, None).expect_err("no start recorded");
        assert!(err.reason().contains("never recorded"));
    }

    proptest! {
        /// 任意推进序列下，经过时长等于推进量之和。
        #[test]
        fn elapsed_matches_sum_of_advances(steps in proptest::collection::vec(0u64..10_000, 0..32)) {
            let clock = MockClock::new();
            let start = clock.now().expect("readable");
            let mut total = Duration::ZERO;
            for millis in steps {
                let step = Duration::from_millis(millis);
                clock.advance(step);
                total += step;
            }
            prop_assert_eq!(elapsed_since(&clock, Some(start)).expect("readable"), total);
        }
    }
}
