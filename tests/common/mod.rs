#![allow(dead_code)]

pub use scidag_test_utils::{builders, counting_executor, init_tracing, sources, with_timeout};
