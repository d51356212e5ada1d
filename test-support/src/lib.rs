//! 测试支持 crate
//!
//! 提供测试运行器和 Mock 实现（帧分配器、TLB、中断控制器、配置）

#![no_std]

extern crate alloc;

pub mod mock;

/// 测试运行器
pub fn test_runner(tests: &[&dyn Fn()]) {
    for test in tests {
        test();
    }
}
