//! 中断控制相关操作的 Mock 实现
//!
//! 用一个原子标志模拟单个处理器的本地中断使能位。

use core::sync::atomic::{AtomicUsize, Ordering};

/// Mock 的中断控制器
///
/// 状态字约定：非零表示中断启用，零表示中断禁用。
pub struct MockIntrCtrl {
    enabled: AtomicUsize,
}

impl MockIntrCtrl {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicUsize::new(1),
        }
    }

    /// 读取并禁用中断，返回之前的状态字
    pub fn read_and_disable(&self) -> usize {
        self.enabled.swap(0, Ordering::AcqRel)
    }

    /// 恢复之前保存的中断状态字
    pub fn restore(&self, flags: usize) {
        self.enabled.store(flags, Ordering::Release);
    }

    /// 检查中断当前是否处于启用状态
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) != 0
    }

    /// 强制把中断置为启用状态（测试初始化用）
    pub fn force_enable(&self) {
        self.enabled.store(1, Ordering::Release);
    }
}

impl Default for MockIntrCtrl {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_INTR_CTRL: MockIntrCtrl = MockIntrCtrl::new();
